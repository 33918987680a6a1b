use ambivox::math::{Quat, Vec3};
use ambivox::{
    Ambience, AmbienceSound, AssetKind, AssetLoader, AudioAsset, AudioContext, AudioDesc,
    DecodedAudio, LoadNotifier, LoopSound, OutputDesc, OutputStream, Playable, Pose,
    SoftwareBackend, TrackMixer,
};
use anyhow::{Context as _, Result, bail};
use clap::Parser;
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const TICK_RATE: f32 = 60.0;

/// Spatial ambience and music crossfade demo.
#[derive(Debug, Parser)]
#[command(name = "ambivox-demo", version)]
pub struct Args {
    /// Audio settings JSON (defaults when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ambience sound-set JSON (generated tones when omitted)
    #[arg(long)]
    pub sound_set: Option<PathBuf>,

    /// Two music files to crossfade between
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
    pub music: Vec<PathBuf>,

    /// How long to run
    #[arg(long, default_value_t = 20.0)]
    pub seconds: f32,
}

/// Sine partials with a fade at both ends so loops and one-shots don't click.
fn synth(partials: &[f32], seconds: f32, channels: u16, amplitude: f32, rate: u32) -> DecodedAudio {
    let frames = (seconds * rate as f32) as usize;
    let fade = (rate as usize / 50).min(frames / 2).max(1);
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let envelope = (i.min(frames - i) as f32 / fade as f32).min(1.0);
        let value: f32 = partials.iter().map(|f| (t * f * TAU).sin()).sum::<f32>()
            / partials.len().max(1) as f32;
        let sample = value * amplitude * envelope;
        samples.extend(std::iter::repeat_n(sample, channels as usize));
    }
    DecodedAudio::new(samples, rate, channels)
}

fn synth_asset(
    context: &AudioContext,
    name: &str,
    kind: AssetKind,
    partials: &[f32],
    seconds: f32,
) -> Result<Arc<AudioAsset>> {
    let channels = match kind {
        AssetKind::Sound => 1,
        AssetKind::Music => 2,
    };
    let audio = synth(partials, seconds, channels, 0.4, context.desc().frequency);
    Ok(AudioAsset::from_samples(context, name, kind, audio)?)
}

fn default_soundscape(context: &AudioContext, ambience: &mut Ambience) -> Result<()> {
    let bed = synth_asset(context, "hum", AssetKind::Sound, &[55.0, 110.0, 165.0], 4.0)?;
    ambience.set_loop_sound(Some(LoopSound::new(bed, 0.3)));

    let chirp = synth_asset(context, "chirp", AssetKind::Sound, &[2200.0, 3300.0], 0.15)?;
    let knock = synth_asset(context, "knock", AssetKind::Sound, &[180.0, 240.0], 0.08)?;
    let bell = synth_asset(context, "bell", AssetKind::Sound, &[880.0, 1320.0, 1760.0], 0.6)?;
    ambience.set_sounds(vec![
        AmbienceSound::new(chirp).pitch_range(0.8, 1.3).velocity(4.0),
        AmbienceSound::new(knock).gain(0.8).pitch_range(0.9, 1.1),
        AmbienceSound::new(bell).gain(0.5).pitch_range(0.7, 1.0),
    ]);
    Ok(())
}

fn music_tracks(
    context: &AudioContext,
    loader: &AssetLoader,
    paths: &[PathBuf],
) -> Result<Vec<Arc<dyn Playable>>> {
    if !paths.is_empty() {
        return Ok(paths
            .iter()
            .map(|path| loader.request_music(path) as Arc<dyn Playable>)
            .collect());
    }
    let day = synth_asset(context, "day", AssetKind::Music, &[261.6, 329.6, 392.0], 3.0)?;
    let night = synth_asset(context, "night", AssetKind::Music, &[220.0, 261.6, 329.6], 3.0)?;
    Ok(vec![day as Arc<dyn Playable>, night])
}

pub fn run(args: Args) -> Result<()> {
    let desc = match &args.config {
        Some(path) => AudioDesc::from_json_file(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?,
        None => AudioDesc::default(),
    };

    let backend = SoftwareBackend::default();
    let mix = backend.mixer();
    let context = AudioContext::new(desc, backend);
    if !context.initialize() {
        bail!("audio context could not be initialized");
    }

    let mut output = OutputStream::new(OutputDesc::default());
    if let Err(e) = output.start(mix) {
        log::warn!("No output device, running silently: {}", e);
    }

    let notifier = LoadNotifier::new();
    let loader = AssetLoader::new(context.clone(), notifier.clone());
    let mut ambience = Ambience::new(context.clone(), notifier.clone());
    match &args.sound_set {
        Some(path) => {
            if !ambience.load_sound_set(path, &loader) {
                bail!("failed to load sound set '{}'", path.display());
            }
        }
        None => default_soundscape(&context, &mut ambience)?,
    }

    let mut music = TrackMixer::new(context.clone(), notifier);
    let tracks = music_tracks(&context, &loader, &args.music)?;
    if let Some(first) = tracks.first() {
        music.set_sound_track(first.clone(), false);
    }

    loader.process_pending();
    if !ambience.start() {
        log::warn!("Ambience did not start");
    }

    let seconds = args.seconds.max(0.0);
    let ticks = (seconds * TICK_RATE) as usize;
    let dt = 1.0 / TICK_RATE;
    log::info!("Running for {:.1} s", seconds);

    for tick in 0..ticks {
        loader.process_pending();

        let angle = tick as f32 * dt * 0.2;
        let position = Vec3::new(angle.cos() * 5.0, 0.0, angle.sin() * 5.0);
        let velocity = Vec3::new(-angle.sin(), 0.0, angle.cos()) * 5.0 * 0.2;
        context.set_listener_pose(
            Pose::new(position, Quat::from_rotation_y(-angle)),
            velocity,
        );

        if tick == ticks / 2 {
            if let Some(second) = tracks.get(1) {
                music.set_sound_track(second.clone(), true);
            }
        }

        ambience.update(dt);
        music.update();
        std::thread::sleep(Duration::from_secs_f32(dt));
    }

    ambience.stop();
    music.stop();
    output.stop();
    log::info!(
        "Rendered {} frames, {} voices free",
        output.frames_processed(),
        context.available_voice_count()
    );
    drop(music);
    context.shutdown();
    Ok(())
}
