use serde::{Deserialize, Serialize};
use tracing::info;

/// One rung of the codec preference ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpec {
    /// Full codec specification, e.g. "audio/webm;codecs=opus"
    pub mime: &'static str,
    /// Native capture rate when this codec is selected
    pub native_sample_rate_hz: u32,
}

/// Preference order: precise container+codec pairs first, generic MPEG
/// audio last. The first rung the runtime reports as encodable wins.
pub const CODEC_LADDER: &[CodecSpec] = &[
    CodecSpec {
        mime: "audio/webm;codecs=opus",
        native_sample_rate_hz: 48_000,
    },
    CodecSpec {
        mime: "audio/mp4;codecs=mp4a.40.2",
        native_sample_rate_hz: 44_100,
    },
    CodecSpec {
        mime: "audio/mpeg",
        native_sample_rate_hz: 44_100,
    },
];

/// PCM fallback parameters (16kHz mono, 20ms frames)
pub const PCM_FALLBACK_SAMPLE_RATE_HZ: u32 = 16_000;
pub const PCM_FALLBACK_FRAME_DURATION_MS: u32 = 20;

const FRAME_DURATION_MS: u32 = 20;
const MOBILE_CHUNK_INTERVAL_MS: u64 = 1_000;
const DESKTOP_CHUNK_INTERVAL_MS: u64 = 3_000;

/// Runtime encoder support, probed synchronously with no I/O.
///
/// The embedding environment implements this; tests inject fixed
/// support sets to make negotiation deterministic.
pub trait EncoderRegistry {
    /// Whether the runtime can encode the given codec specification
    fn is_encodable(&self, spec: &CodecSpec) -> bool;
}

/// Device form factor, derived from environment hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormFactor {
    Mobile,
    #[default]
    Desktop,
}

/// Environment hints used to tune chunking, never to gate features.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceHints {
    pub form_factor: FormFactor,
}

impl DeviceHints {
    /// Derive hints from a user-agent style identification string.
    ///
    /// Detection works from declared identity, not from which platform
    /// APIs happen to exist.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let mobile = ["android", "iphone", "ipad", "ipod", "mobile"]
            .iter()
            .any(|marker| ua.contains(marker));

        Self {
            form_factor: if mobile {
                FormFactor::Mobile
            } else {
                FormFactor::Desktop
            },
        }
    }

    /// Mobile devices get a shorter chunk interval to bound end-to-end
    /// latency on flakier networks.
    pub fn recommended_chunk_interval_ms(&self) -> u64 {
        match self.form_factor {
            FormFactor::Mobile => MOBILE_CHUNK_INTERVAL_MS,
            FormFactor::Desktop => DESKTOP_CHUNK_INTERVAL_MS,
        }
    }
}

/// Immutable result of capability negotiation.
///
/// Computed once per recording attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCapabilities {
    /// Selected codec specification, or None when falling back to PCM
    pub supported_encoding: Option<String>,
    /// Whether raw PCM framing is in effect
    pub is_pcm_fallback: bool,
    /// Capture sample rate in Hz
    pub sample_rate_hz: u32,
    /// Number of channels after downmix (always mono on the wire)
    pub channel_count: u16,
    /// Bits per sample for wire transmission
    pub bit_depth: u16,
    /// Duration of one frame in milliseconds
    pub frame_duration_ms: u32,
    /// Samples per frame at the capture rate
    pub frame_sample_count: usize,
    /// How often the caller should flush chunks upstream
    pub recommended_chunk_interval_ms: u64,
}

/// Resolve capabilities for one recording attempt.
///
/// Tries each ladder rung in order; the first encodable rung wins and
/// its native rate becomes the capture rate. Absence of every encoder
/// is itself the PCM fallback result, never a failure.
pub fn negotiate(registry: &dyn EncoderRegistry, hints: &DeviceHints) -> AudioCapabilities {
    let chunk_interval_ms = hints.recommended_chunk_interval_ms();

    for spec in CODEC_LADDER {
        if registry.is_encodable(spec) {
            info!(
                "Negotiated encoder: {} at {}Hz",
                spec.mime, spec.native_sample_rate_hz
            );

            let sample_rate_hz = spec.native_sample_rate_hz;
            return AudioCapabilities {
                supported_encoding: Some(spec.mime.to_string()),
                is_pcm_fallback: false,
                sample_rate_hz,
                channel_count: 1,
                bit_depth: 16,
                frame_duration_ms: FRAME_DURATION_MS,
                frame_sample_count: (sample_rate_hz * FRAME_DURATION_MS / 1000) as usize,
                recommended_chunk_interval_ms: chunk_interval_ms,
            };
        }
    }

    info!("No supported encoder, falling back to raw PCM framing");

    AudioCapabilities {
        supported_encoding: None,
        is_pcm_fallback: true,
        sample_rate_hz: PCM_FALLBACK_SAMPLE_RATE_HZ,
        channel_count: 1,
        bit_depth: 16,
        frame_duration_ms: PCM_FALLBACK_FRAME_DURATION_MS,
        frame_sample_count: (PCM_FALLBACK_SAMPLE_RATE_HZ * PCM_FALLBACK_FRAME_DURATION_MS / 1000)
            as usize,
        recommended_chunk_interval_ms: chunk_interval_ms,
    }
}
