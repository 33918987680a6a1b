mod common;

use ambivox::math::Vec3;
use ambivox::{Ambience, AmbienceSound, AssetKind, AssetLoader, LoadNotifier, LoopSound, Pose};
use common::{software_context, tone, write_wav};

#[test]
fn test_empty_ambience_does_not_start() {
    let (context, _mixer) = software_context(4);
    let mut ambience = Ambience::new(context.clone(), LoadNotifier::new());
    assert!(!ambience.start());
    assert!(!ambience.is_playing());
    assert_eq!(context.available_voice_count(), 4);
}

#[test]
fn test_sound_set_from_disk() {
    let (context, _mixer) = software_context(8);
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("wind.wav"), 9600);
    write_wav(&dir.path().join("bird.wav"), 2400);
    write_wav(&dir.path().join("owl.wav"), 2400);
    let set_path = dir.path().join("forest.json");
    std::fs::write(
        &set_path,
        r#"{
            "loop": { "file": "wind.wav", "gain": 0.4 },
            "channels": 3, "radius": 12.0, "min_delay": 0.1, "max_delay": 0.3,
            "sounds": [
                { "file": "bird.wav", "min_pitch": 0.9, "max_pitch": 1.1 },
                { "file": "owl.wav", "gain": 0.7 }
            ]
        }"#,
    )
    .unwrap();

    let notifier = LoadNotifier::new();
    let loader = AssetLoader::new(context.clone(), notifier.clone());
    let mut ambience = Ambience::with_seed(context.clone(), notifier, 42);
    assert!(ambience.load_sound_set(&set_path, &loader));
    assert_eq!(ambience.sounds().len(), 2);
    assert_eq!(ambience.radius(), 12.0);
    assert_eq!(loader.process_pending(), 3);

    let listener = Vec3::new(10.0, 0.0, -5.0);
    context.set_listener_pose(Pose::from_position(listener), Vec3::ZERO);

    assert!(ambience.start());
    assert_eq!(ambience.channel_count(), 3);
    assert_eq!(context.available_voice_count(), 4);
    let loop_voice = ambience.loop_voice().unwrap();
    assert!(loop_voice.is_playing());
    assert!(loop_voice.flags().looping);
    assert_eq!(loop_voice.gain(), 0.4);

    let mut started = 0;
    for _ in 0..40 {
        ambience.update(0.05);
        for channel in ambience.channels() {
            if channel.voice().playable().is_some() {
                started += 1;
                assert!(channel.position().distance(listener) <= 12.0 + 1e-3);
                assert!((0.5..=2.0).contains(&channel.voice().pitch()));
            }
        }
    }
    assert!(started > 0);

    ambience.stop();
    assert!(!ambience.is_playing());
    assert_eq!(context.available_voice_count(), 8);
}

#[test]
fn test_partial_allocation_keeps_what_it_got() {
    let (context, _mixer) = software_context(2);
    let mut ambience = Ambience::new(context.clone(), LoadNotifier::new());
    ambience.set_loop_sound(Some(LoopSound::new(
        tone(&context, "rain", AssetKind::Sound, 4800),
        1.0,
    )));
    ambience.add_sound(AmbienceSound::new(tone(&context, "drip", AssetKind::Sound, 480)));
    ambience.set_channel_count(4);

    assert!(ambience.start());
    assert!(ambience.loop_voice().is_some());
    assert_eq!(ambience.channels().len(), 1);
    assert_eq!(context.available_voice_count(), 0);

    drop(ambience);
    assert_eq!(context.available_voice_count(), 2);
}

#[test]
fn test_exhausted_pool_fails_to_start() {
    let (context, _mixer) = software_context(1);
    let _held = context.allocate_voice().unwrap();
    let mut ambience = Ambience::new(context.clone(), LoadNotifier::new());
    ambience.add_sound(AmbienceSound::new(tone(&context, "drip", AssetKind::Sound, 480)));

    assert!(!ambience.start());
    assert!(!ambience.is_playing());
    assert!(ambience.channels().is_empty());
}
