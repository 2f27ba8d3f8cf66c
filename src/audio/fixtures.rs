//! WAV fixtures shared by the audio and transcription tests.

use std::io::Cursor;

/// Encode 16-bit samples into a WAV container with the given layout.
pub fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buffer = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec).expect("in-memory WAV header");
    for &sample in samples {
        writer.write_sample(sample).expect("in-memory WAV sample");
    }
    writer.finalize().expect("in-memory WAV finalize");
    buffer
}

/// Read back the format of a WAV produced by the code under test.
pub fn wav_spec(bytes: &[u8]) -> hound::WavSpec {
    hound::WavReader::new(Cursor::new(bytes)).expect("readable WAV").spec()
}

/// One second of a quiet 440 Hz tone at 16 kHz mono.
pub fn tone_16k_mono() -> Vec<u8> {
    let samples: Vec<i16> = (0..16000)
        .map(|i| {
            let t = i as f64 / 16000.0;
            ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 8000.0) as i16
        })
        .collect();
    wav_bytes(16000, 1, &samples)
}
