//! Audio assembly integration tests

use std::io::Cursor;

use script_narrator::audio::{
    Framer, WAV_HEADER_LEN, concatenate, decode_pcm16, decode_wav, mux_wav, samples_to_pcm16_le,
};

#[test]
fn test_master_wav_is_readable_by_standard_decoders() {
    let parts: Vec<Vec<u8>> = (0u8..3)
        .map(|i| samples_to_pcm16_le(&vec![0.1 * f32::from(i); 240]))
        .collect();
    let pcm = concatenate(&parts);
    let wav = mux_wav(&pcm, 24_000, 1);

    assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());

    let mut reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 24_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.duration(), 720);

    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert!(samples[..240].iter().all(|&s| s == 0));
    assert!(samples[480..].iter().all(|&s| s > 6000));

    let decoded = decode_wav(&wav).unwrap();
    assert_eq!(decoded, decode_pcm16(&pcm, 24_000, 1));
    assert!((decoded.duration() - 0.03).abs() < 1e-9);
}

#[test]
fn test_empty_master_still_has_header() {
    let wav = mux_wav(&concatenate::<Vec<u8>>(&[]), 24_000, 1);
    assert_eq!(wav.len(), WAV_HEADER_LEN);
    assert_eq!(hound::WavReader::new(Cursor::new(&wav)).unwrap().len(), 0);
}

#[test]
fn test_capture_framing_keeps_remainder() {
    let mut framer = Framer::new(4096);

    assert!(framer.push(&[0.0; 3000]).is_empty());
    let frames = framer.push(&[0.0; 6000]);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.len() == 4096));
    assert_eq!(framer.pending(), 9000 - 8192);
}
