//! Encode note streams to bytes and play them back against a virtual clock

use std::collections::BTreeSet;

use drivetone::midi::MidiSong;
use drivetone::pipeline::{
    AffinityConfig, EventCollector, Orchestration, ProtocolEncoder, Strategy,
};
use drivetone::playback::{
    decode_bytes, timeline, Actuator, Clock, ActuatorError, PlaybackOutcome, Scheduler, SchedulerConfig,
    Span, VirtualClock,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Play(u32, usize, u16),
    Stop(u32, usize),
    Silence(u32),
}

struct Recorder {
    clock: VirtualClock,
    voices: usize,
    calls: Vec<Call>,
}

impl Actuator for Recorder {
    fn voices(&self) -> usize {
        self.voices
    }

    fn play(&mut self, voice: usize, frequency: u16) -> Result<(), ActuatorError> {
        self.calls
            .push(Call::Play(self.clock.now_ms(), voice, frequency));
        Ok(())
    }

    fn stop(&mut self, voice: usize) {
        self.calls.push(Call::Stop(self.clock.now_ms(), voice));
    }

    fn silence(&mut self) {
        self.calls.push(Call::Silence(self.clock.now_ms()));
    }
}

fn encode(strategy: Strategy, collector: EventCollector) -> Vec<u8> {
    let mut encoder = ProtocolEncoder::from_strategy(strategy).unwrap();
    let mut bytes = Vec::new();
    encoder
        .write_events(collector.into_events(), &mut bytes)
        .unwrap();
    bytes
}

fn play(bytes: &[u8], voices: usize) -> Vec<Call> {
    let clock = VirtualClock::new();
    let recorder = Recorder {
        clock: clock.clone(),
        voices,
        calls: Vec::new(),
    };
    let mut scheduler = Scheduler::new(SchedulerConfig::default(), recorder, clock);
    let outcome = scheduler.play(bytes).unwrap();
    assert!(matches!(outcome, PlaybackOutcome::Completed { .. }));
    scheduler.into_actuator().calls
}

#[test]
fn test_affinity_song_round_trip() {
    let strategy = Strategy::ChannelAffinity(AffinityConfig::default());
    let mut collector = EventCollector::new(strategy.channel_filter());
    collector.log_note_on(60, 1, 100);
    collector.log_note_on(64, 2, 100);
    // percussion never reaches the stream
    collector.log_note_on(36, 10, 100);
    collector.log_delay(0.5);
    collector.log_note_off(60, 1);
    collector.log_note_off(64, 2);
    // close enough that the release merges into the next note
    collector.log_delay(0.005);
    collector.log_note_on(67, 2, 100);
    collector.log_delay(0.25);
    collector.log_note_off(67, 2);

    let bytes = encode(strategy, collector);
    assert_eq!(
        bytes,
        vec![
            0x11, 0x06, // voice 2, 262 Hz
            0x01, 0x4A, // voice 0, 330 Hz
            0x81, 0xF9, // 505 ms
            0x01, 0x88, // voice 0, 392 Hz
            0xC0, 0x04, // stop voice 2
            0x80, 0xFA, // 250 ms
            0xC0, 0x01, // stop voice 0
        ]
    );

    assert_eq!(
        play(&bytes, 4),
        vec![
            Call::Play(0, 2, 262),
            Call::Play(0, 0, 330),
            Call::Play(505, 0, 392),
            Call::Stop(505, 2),
            Call::Stop(755, 0),
            Call::Silence(755),
        ]
    );
}

#[test]
fn test_orchestrated_song_round_trip() {
    let orchestration = Orchestration::from_json(r#"{"voices": [[-3], [3]]}"#).unwrap();
    let strategy = Strategy::Orchestrated(orchestration);
    let mut collector = EventCollector::new(strategy.channel_filter());
    collector.log_note_on(60, 3, 100);
    collector.log_note_on(64, 3, 100);
    collector.log_note_on(67, 3, 100);
    // not orchestrated
    collector.log_note_on(50, 1, 100);
    collector.log_delay(0.4);
    collector.log_note_off(67, 3);
    collector.log_delay(0.1);
    collector.log_note_on(72, 3, 100);
    collector.log_delay(0.5);
    collector.log_note_off(60, 3);
    collector.log_note_off(64, 3);
    collector.log_note_off(72, 3);

    let bytes = encode(strategy, collector);
    assert_eq!(
        play(&bytes, 2),
        vec![
            Call::Play(0, 0, 262),
            Call::Play(0, 1, 392),
            // top note released, the next highest takes over
            Call::Play(400, 1, 330),
            Call::Play(500, 1, 523),
            Call::Stop(1000, 0),
            Call::Stop(1000, 1),
            Call::Silence(1000),
        ]
    );
}

#[test]
fn test_player_with_fewer_voices_skips_the_rest() {
    let strategy = Strategy::ChannelAffinity(AffinityConfig::default());
    let mut collector = EventCollector::new(strategy.channel_filter());
    collector.log_note_on(60, 1, 100);
    collector.log_note_on(64, 2, 100);
    collector.log_delay(0.1);
    collector.log_note_off(60, 1);
    collector.log_note_off(64, 2);

    let bytes = encode(strategy, collector);
    assert_eq!(
        play(&bytes, 1),
        vec![Call::Play(0, 0, 330), Call::Stop(100, 0), Call::Silence(100)]
    );
}

#[test]
fn test_midi_file_to_timeline() {
    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        )
    }

    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(480))));
    smf.tracks = vec![
        vec![
            event(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Melody"))),
            note(0, 0, 72, 100),
            note(480, 0, 72, 0),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ],
        vec![
            note(0, 1, 48, 90),
            note(960, 1, 48, 0),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ],
    ];
    let mut file = Vec::new();
    smf.write(&mut file).unwrap();

    let song = MidiSong::parse(&file).unwrap();
    assert_eq!(song.melody_channels(), &BTreeSet::from([1]));

    let strategy = Strategy::ChannelAffinity(AffinityConfig {
        priority_channels: song.melody_channels().clone(),
        ..Default::default()
    });
    let mut collector = EventCollector::new(strategy.channel_filter());
    song.feed(&mut collector);
    let bytes = encode(strategy, collector);

    let timeline = timeline(decode_bytes(&bytes));
    assert_eq!(timeline.duration_ms, 1000);
    assert_eq!(
        timeline.spans,
        vec![
            Span {
                voice: 0,
                frequency: 131,
                start_ms: 0,
                end_ms: 1000
            },
            Span {
                voice: 2,
                frequency: 523,
                start_ms: 0,
                end_ms: 500
            },
        ]
    );
}
