//! Container decode/encode.
//!
//! Decode accepts whatever the user's browser hands us — WAV from the
//! recorder, MP3/AAC/Ogg uploads — via symphonia's probe. Encode always
//! produces plain 16-bit PCM WAV (44-byte RIFF header) so the playback layer
//! gets one predictable container back regardless of what came in.
//!
//! Quantization on encode is symmetric: samples are clamped to [-1, 1] and
//! negative values scale by 32768, positive by 32767.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::error::{RepriseError, Result};

/// Decode arbitrary audio bytes into planar f32 PCM.
///
/// `extension_hint` (e.g. `"mp3"`) speeds up container probing when the
/// caller knows the original filename; pass `None` for raw blobs.
///
/// # Errors
/// `RepriseError::Decode` on malformed or unsupported input. There is no
/// partial result — a clip either decodes fully or not at all.
pub fn decode(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<AudioBuffer> {
    if bytes.is_empty() {
        return Err(RepriseError::Decode("empty input".into()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| RepriseError::Decode(format!("unrecognized container: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| RepriseError::Decode("no default audio track".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| RepriseError::Decode("missing sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| RepriseError::Decode(format!("unsupported codec: {e}")))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(RepriseError::Decode(err.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| RepriseError::Decode(e.to_string()))?;
        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count.max(1)];
        }
        for frame in sample_buf.samples().chunks_exact(channel_count.max(1)) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
    }

    if channels.is_empty() || channels[0].is_empty() {
        return Err(RepriseError::Decode("no audio frames in input".into()));
    }

    debug!(
        sample_rate,
        channels = channels.len(),
        frames = channels[0].len(),
        "decoded clip"
    );
    AudioBuffer::new(channels, sample_rate)
}

/// Fast path for the WAV container this engine itself produces.
///
/// Accepts 16/24/32-bit integer and f32 WAV; anything hound rejects comes
/// back as `RepriseError::Decode`.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| RepriseError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channel_count = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| RepriseError::Decode(e.to_string())))
            .collect::<Result<Vec<_>>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample <= 16 {
                reader
                    .samples::<i16>()
                    .map(|s| {
                        s.map(|v| v as f32 / 32768.0)
                            .map_err(|e| RepriseError::Decode(e.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| {
                        s.map(|v| v as f32 / max)
                            .map_err(|e| RepriseError::Decode(e.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        }
    };

    AudioBuffer::from_interleaved(&interleaved, channel_count, spec.sample_rate)
}

/// Encode a buffer as 16-bit PCM WAV, preserving channel count and rate.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| RepriseError::Encode(e.to_string()))?;
        for sample in buffer.interleaved() {
            writer
                .write_sample(quantize_i16(sample))
                .map_err(|e| RepriseError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| RepriseError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Round-to-nearest 16-bit quantization with symmetric range usage.
fn quantize_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let scaled = if clamped < 0.0 {
        clamped * 32768.0
    } else {
        clamped * 32767.0
    };
    scaled.round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_uses_full_symmetric_range() {
        assert_eq!(quantize_i16(-1.0), i16::MIN);
        assert_eq!(quantize_i16(1.0), i16::MAX);
        assert_eq!(quantize_i16(0.0), 0);
        // Out-of-range input clamps rather than wrapping.
        assert_eq!(quantize_i16(-2.5), i16::MIN);
        assert_eq!(quantize_i16(3.0), i16::MAX);
    }

    #[test]
    fn wav_header_is_44_bytes() {
        let buf = AudioBuffer::mono(vec![0.25; 100], 16_000).expect("valid buffer");
        let bytes = encode_wav(&buf).expect("encode");
        assert_eq!(bytes.len(), 44 + 100 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn wav_round_trip_preserves_shape_and_content() {
        let left: Vec<f32> = (0..256).map(|i| (i as f32 / 256.0).sin() * 0.8).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let buf = AudioBuffer::new(vec![left.clone(), right], 44_100).expect("valid buffer");

        let bytes = encode_wav(&buf).expect("encode");
        let decoded = decode_wav(&bytes).expect("decode");

        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.sample_rate(), 44_100);
        assert_eq!(decoded.frames(), 256);
        for (a, b) in left.iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() < 1.0 / 32_000.0, "a={a} b={b}");
        }
    }

    #[test]
    fn probe_round_trip_reads_engine_wav() {
        let buf = AudioBuffer::mono(vec![0.5; 480], 48_000).expect("valid buffer");
        let bytes = encode_wav(&buf).expect("encode");
        let decoded = decode(bytes, Some("wav")).expect("probe decode");
        assert_eq!(decoded.sample_rate(), 48_000);
        assert_eq!(decoded.frames(), 480);
    }

    #[test]
    fn empty_input_is_a_decode_error() {
        let err = decode(Vec::new(), None).unwrap_err();
        assert!(matches!(err, RepriseError::Decode(_)));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let err = decode(vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x01], None).unwrap_err();
        assert!(matches!(err, RepriseError::Decode(_)));
    }
}
