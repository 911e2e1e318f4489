//! The sink's capability model: what video/audio formats it advertises,
//! and how to render them into WFD parameter strings during M3.

use crate::config::CapabilityConfig;

/// H.264 level bits, matching the comment in the WFD video-formats field:
/// 3.1 -> 0x01, 3.2 -> 0x02 (720p60), 4.0 -> 0x04, 4.1 -> 0x08 (1080p24),
/// 4.2 -> 0x10 (1080p60).
const LEVEL_3_1: u8 = 0x01;
const LEVEL_3_2: u8 = 0x02;
const LEVEL_4_0: u8 = 0x04;
const LEVEL_4_1: u8 = 0x08;
const LEVEL_4_2: u8 = 0x10;

/// One entry of the static WFD resolution table: the pixel layout a given
/// mode-id represents, and the H.264 level required to decode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionMode {
    pub width: u16,
    pub height: u16,
    pub refresh_hz: u8,
    pub progressive: bool,
    pub required_level: u8,
}

const fn mode(width: u16, height: u16, refresh_hz: u8, progressive: bool, required_level: u8) -> ResolutionMode {
    ResolutionMode { width, height, refresh_hz, progressive, required_level }
}

/// CEA mode-ids 0-26, indexed by position (mode 0 is the mandatory 640x480p60).
pub const CEA_MODES: &[ResolutionMode] = &[
    mode(640, 480, 60, true, LEVEL_3_1),   // 0 - mandatory
    mode(720, 480, 60, true, LEVEL_3_1),   // 1
    mode(720, 480, 60, false, LEVEL_3_1),  // 2
    mode(720, 480, 50, true, LEVEL_3_1),   // 3
    mode(720, 576, 50, false, LEVEL_3_1),  // 4
    mode(1280, 720, 30, true, LEVEL_3_2),  // 5
    mode(1280, 720, 60, true, LEVEL_3_2),  // 6
    mode(1920, 1080, 30, true, LEVEL_4_0), // 7
    mode(1920, 1080, 60, true, LEVEL_4_2), // 8
    mode(1920, 1080, 60, false, LEVEL_4_0),// 9
    mode(1280, 720, 25, true, LEVEL_3_2),  // 10
    mode(1280, 720, 50, true, LEVEL_3_2),  // 11
    mode(1920, 1080, 25, true, LEVEL_4_0), // 12
    mode(1920, 1080, 50, true, LEVEL_4_2), // 13
    mode(1920, 1080, 50, false, LEVEL_4_0),// 14
    mode(1280, 720, 24, true, LEVEL_3_2),  // 15
    mode(1920, 1080, 24, true, LEVEL_4_1), // 16
    mode(3840, 2160, 30, true, LEVEL_4_2), // 17
    mode(3840, 2160, 60, true, LEVEL_4_2), // 18
    mode(4096, 2160, 30, true, LEVEL_4_2), // 19
    mode(4096, 2160, 60, true, LEVEL_4_2), // 20
    mode(3840, 2160, 25, true, LEVEL_4_2), // 21
    mode(3840, 2160, 50, true, LEVEL_4_2), // 22
    mode(4096, 2160, 25, true, LEVEL_4_2), // 23
    mode(4096, 2160, 50, true, LEVEL_4_2), // 24
    mode(4096, 2160, 24, true, LEVEL_4_2), // 25
    mode(4096, 2160, 24, true, LEVEL_4_2), // 26
];

/// VESA mode-ids 0-28.
pub const VESA_MODES: &[ResolutionMode] = &[
    mode(800, 600, 30, true, LEVEL_3_1),   // 0
    mode(800, 600, 60, true, LEVEL_3_1),   // 1
    mode(1024, 768, 30, true, LEVEL_3_1),  // 2
    mode(1024, 768, 60, true, LEVEL_3_1),  // 3
    mode(1152, 854, 30, true, LEVEL_3_2),  // 4
    mode(1152, 854, 60, true, LEVEL_3_2),  // 5
    mode(1280, 768, 30, true, LEVEL_3_2),  // 6
    mode(1280, 768, 60, true, LEVEL_3_2),  // 7
    mode(1280, 800, 30, true, LEVEL_3_2),  // 8
    mode(1280, 800, 60, true, LEVEL_3_2),  // 9
    mode(1360, 768, 30, true, LEVEL_3_2),  // 10
    mode(1360, 768, 60, true, LEVEL_3_2),  // 11
    mode(1366, 768, 30, true, LEVEL_3_2),  // 12
    mode(1366, 768, 60, true, LEVEL_3_2),  // 13
    mode(1280, 1024, 30, true, LEVEL_4_0), // 14
    mode(1280, 1024, 60, true, LEVEL_4_0), // 15
    mode(1440, 1050, 30, true, LEVEL_4_0), // 16
    mode(1440, 1050, 60, true, LEVEL_4_0), // 17
    mode(1440, 900, 30, true, LEVEL_3_2),  // 18
    mode(1440, 900, 60, true, LEVEL_3_2),  // 19
    mode(1600, 900, 30, true, LEVEL_4_0),  // 20
    mode(1600, 900, 60, true, LEVEL_4_0),  // 21
    mode(1600, 1200, 30, true, LEVEL_4_0), // 22
    mode(1600, 1200, 60, true, LEVEL_4_1), // 23
    mode(1680, 1024, 30, true, LEVEL_4_0), // 24
    mode(1680, 1024, 60, true, LEVEL_4_0), // 25
    mode(1680, 1050, 30, true, LEVEL_4_0), // 26
    mode(1680, 1050, 60, true, LEVEL_4_1), // 27
    mode(1920, 1200, 30, true, LEVEL_4_1), // 28
];

/// Handheld (HH) mode-ids 0-11.
pub const HH_MODES: &[ResolutionMode] = &[
    mode(800, 400, 30, true, LEVEL_3_1),
    mode(800, 480, 60, true, LEVEL_3_1),
    mode(854, 480, 30, true, LEVEL_3_1),
    mode(854, 480, 60, true, LEVEL_3_1),
    mode(864, 480, 30, true, LEVEL_3_1),
    mode(864, 480, 60, true, LEVEL_3_1),
    mode(640, 360, 30, true, LEVEL_3_1),
    mode(640, 360, 60, true, LEVEL_3_1),
    mode(960, 540, 30, true, LEVEL_3_2),
    mode(960, 540, 60, true, LEVEL_3_2),
    mode(848, 480, 30, true, LEVEL_3_1),
    mode(848, 480, 60, true, LEVEL_3_1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionGroup {
    Cea,
    Vesa,
    Hh,
}

impl ResolutionGroup {
    fn table(self) -> &'static [ResolutionMode] {
        match self {
            ResolutionGroup::Cea => CEA_MODES,
            ResolutionGroup::Vesa => VESA_MODES,
            ResolutionGroup::Hh => HH_MODES,
        }
    }
}

/// A display mode as reported by the platform probe (e.g. `tvservice -m CEA -j`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformMode {
    pub width: u16,
    pub height: u16,
    pub refresh_hz: u8,
    pub progressive: bool,
}

/// All display modes the platform probe reported, already split by the
/// group the probe command queried (CEA, VESA/DMT). HH is never populated
/// by a real probe (handheld-only group); it stays empty unless a future
/// probe adds it.
#[derive(Debug, Clone, Default)]
pub struct DisplayModes {
    pub cea: Vec<PlatformMode>,
    pub vesa: Vec<PlatformMode>,
    pub hh: Vec<PlatformMode>,
}

/// Highest `required_level` among the modes asserted in `bitmap`, 0 if none are set.
fn highest_required_level(bitmap: u32, table: &[ResolutionMode]) -> u8 {
    table
        .iter()
        .enumerate()
        .filter(|(idx, _)| bitmap & (1u32 << idx) != 0)
        .map(|(_, m)| m.required_level)
        .max()
        .unwrap_or(0)
}

/// Find the WFD mode-id matching a platform-reported mode, preferring VESA
/// over CEA when both tables contain an identical pixel layout (spec tie-break).
fn resolve_mode_id(probed: PlatformMode) -> Option<(ResolutionGroup, usize)> {
    for group in [ResolutionGroup::Vesa, ResolutionGroup::Cea, ResolutionGroup::Hh] {
        if let Some(idx) = group.table().iter().position(|m| {
            m.width == probed.width && m.height == probed.height && m.refresh_hz == probed.refresh_hz && m.progressive == probed.progressive
        }) {
            return Some((group, idx));
        }
    }
    None
}

/// Immutable, built-once-at-startup description of what this sink supports.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub native_resolution: u8,
    pub preferred_mode: bool,
    pub h264_profile: u8,
    pub h264_level: u8,
    pub cea_bitmap: u32,
    pub vesa_bitmap: u32,
    pub hh_bitmap: u32,
    pub audio_codecs: String,
    pub rtp_client_port: u16,
}

impl Capabilities {
    /// Build capabilities from an optional platform probe result and static config.
    /// Absent probe => generic bitmap with all CEA and VESA bits asserted (spec §6).
    pub fn from_platform_probe(probe: Option<&DisplayModes>, config: &CapabilityConfig) -> Self {
        let (cea_bitmap, vesa_bitmap, hh_bitmap) = match probe {
            Some(modes) => {
                let mut cea = 1u32; // bit 0, 640x480p60, always mandatory
                let mut vesa = 0u32;
                let mut hh = 0u32;
                for probed in modes.cea.iter().chain(modes.vesa.iter()).chain(modes.hh.iter()) {
                    if let Some((group, idx)) = resolve_mode_id(*probed) {
                        let bit = 1u32 << idx;
                        match group {
                            ResolutionGroup::Cea => cea |= bit,
                            ResolutionGroup::Vesa => vesa |= bit,
                            ResolutionGroup::Hh => hh |= bit,
                        }
                    }
                }
                (cea, vesa, hh)
            }
            None => {
                let all_cea = (1u32 << CEA_MODES.len()) - 1;
                let all_vesa = (1u32 << VESA_MODES.len()) - 1;
                (all_cea, all_vesa, 0)
            }
        };

        // The static table is the source of truth for what level a mode needs;
        // config.h264_level is only a ceiling the platform's decoder can't exceed.
        let required_level = highest_required_level(cea_bitmap, CEA_MODES)
            .max(highest_required_level(vesa_bitmap, VESA_MODES))
            .max(highest_required_level(hh_bitmap, HH_MODES));
        let h264_level = required_level.min(config.h264_level);

        Capabilities {
            native_resolution: config.native_resolution,
            preferred_mode: config.preferred_mode,
            h264_profile: config.h264_profile,
            h264_level,
            cea_bitmap,
            vesa_bitmap,
            hh_bitmap,
            audio_codecs: config.audio_codecs.clone(),
            rtp_client_port: config.rtp_port,
        }
    }

    fn wfd_video_formats(&self) -> String {
        format!(
            "{:02X} {:02X} {:02X} {:02X} {:08X} {:08X} {:08X} 00 0000 0000 00 none none",
            self.native_resolution,
            u8::from(self.preferred_mode),
            self.h264_profile,
            self.h264_level,
            self.cea_bitmap,
            self.vesa_bitmap,
            self.hh_bitmap,
        )
    }

    fn wfd_client_rtp_ports(&self) -> String {
        format!("RTP/AVP/UDP;unicast {} 0 mode=play", self.rtp_client_port)
    }

    /// Render the M3 GET_PARAMETER response body: one `key: value` line per
    /// requested key, in request order, `none` for anything unrecognized.
    pub fn render_m3_response(&self, requested_keys: &[String]) -> String {
        let mut body = String::new();
        for key in requested_keys {
            let value = match key.as_str() {
                "wfd_client_rtp_ports" => self.wfd_client_rtp_ports(),
                "wfd_video_formats" => self.wfd_video_formats(),
                "wfd_audio_codecs" => self.audio_codecs.clone(),
                _ => "none".to_string(),
            };
            body.push_str(key);
            body.push_str(": ");
            body.push_str(&value);
            body.push_str("\r\n");
        }
        body
    }
}
