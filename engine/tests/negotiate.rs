use hogout_engine::exclusive::negotiate::select_best_format;
use hogout_engine::format::FORMAT_60958_AC3;
use hogout_engine::{Error, FormatFamily, PhysicalFormat, SampleFormat};

fn pcm(rate: u32, format: SampleFormat, channels: u32) -> PhysicalFormat {
    PhysicalFormat::for_request(format, rate, channels)
}

fn ac3(rate: u32) -> PhysicalFormat {
    PhysicalFormat {
        format_id: FORMAT_60958_AC3,
        ..pcm(rate, SampleFormat::S16, 2)
    }
}

#[test]
fn closest_rate_beats_more_bits() {
    let desired = pcm(48_000, SampleFormat::S16, 2);
    let candidates = [pcm(96_000, SampleFormat::S24, 2), pcm(48_000, SampleFormat::S16, 2)];
    let best = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(best, candidates[1]);
}

#[test]
fn more_bits_break_a_rate_tie() {
    let desired = pcm(48_000, SampleFormat::S16, 2);
    let candidates = [pcm(48_000, SampleFormat::S16, 2), pcm(48_000, SampleFormat::S24, 2)];
    let best = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(best.bits_per_channel, 24);
}

#[test]
fn matching_channel_count_breaks_remaining_ties() {
    let desired = pcm(44_100, SampleFormat::S16, 2);
    let candidates = [pcm(44_100, SampleFormat::S16, 6), pcm(44_100, SampleFormat::S16, 2)];
    let best = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(best.channels_per_frame, 2);
}

#[test]
fn equal_rank_keeps_the_earlier_candidate() {
    let desired = pcm(44_100, SampleFormat::S16, 2);
    let candidates = [pcm(44_100, SampleFormat::S16, 6), pcm(44_100, SampleFormat::S16, 8)];
    let best = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(best.channels_per_frame, 6);
}

#[test]
fn family_outranks_sample_rate() {
    let desired = PhysicalFormat::for_request(SampleFormat::Spdif, 48_000, 2);
    let candidates = [pcm(48_000, SampleFormat::S16, 2), ac3(44_100)];
    let best = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(best.family(), Some(FormatFamily::Compressed));
    assert_eq!(best, candidates[1]);
}

#[test]
fn result_is_a_candidate_and_stable() {
    let desired = pcm(88_200, SampleFormat::F32, 2);
    let candidates = [
        pcm(44_100, SampleFormat::S16, 2),
        pcm(96_000, SampleFormat::S24, 2),
        pcm(88_200, SampleFormat::S16, 2),
        pcm(192_000, SampleFormat::S32, 2),
        ac3(48_000),
    ];
    let first = select_best_format(&desired, &candidates).unwrap();
    let second = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(first, second);
    assert!(candidates.contains(&first));
    assert_eq!(first.sample_rate, 88_200.0);
}

#[test]
fn invalid_entries_are_skipped() {
    let desired = pcm(48_000, SampleFormat::S16, 2);
    let mut broken = pcm(48_000, SampleFormat::S32, 2);
    broken.channels_per_frame = 0;
    let candidates = [PhysicalFormat::default(), broken, pcm(44_100, SampleFormat::S16, 2)];
    let best = select_best_format(&desired, &candidates).unwrap();
    assert_eq!(best, candidates[2]);
}

#[test]
fn no_candidates_is_an_error() {
    let desired = pcm(48_000, SampleFormat::S16, 2);
    let err = select_best_format(&desired, &[]).unwrap_err();
    assert!(matches!(err, Error::NoMatchingFormat(_)));
}

#[test]
fn wrong_family_only_is_an_error() {
    let desired = PhysicalFormat::for_request(SampleFormat::Spdif, 48_000, 2);
    let candidates = [pcm(48_000, SampleFormat::S16, 2), pcm(96_000, SampleFormat::S24, 2)];
    let err = select_best_format(&desired, &candidates).unwrap_err();
    assert!(matches!(err, Error::NoMatchingFormat(_)));
}
