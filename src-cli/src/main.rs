mod args;

use anyhow::{Context, Result};
use args::{CliCommand, USAGE};
use log::{info, warn};
use melograph_core::{
    player_config, segmenter_config, spawn_analysis, AnalysisJob, PlaybackOutcome,
    PlaybackSession, PlayerEvent, SystemClock,
};
use melograph_domain_notes::{note_name, NoteSegmenter};
use melograph_infra_audio_cpal::CpalAudioOutputPort;
use melograph_infra_pitch_yin::{TrackerConfig, YinPitchTracker};
use melograph_infra_storage_fs::{default_notes_path, FsStorage};
use melograph_infra_synth_simple::SimpleSynth;
use melograph_ports::audio::AudioOutputPort;
use melograph_ports::storage::{SettingsDto, StoragePort};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = CliCommand::parse(std::env::args().skip(1))?;
    let storage = Arc::new(FsStorage::default());

    match command {
        CliCommand::Help => {
            println!("{USAGE}");
            Ok(())
        }
        CliCommand::Devices => list_devices(),
        CliCommand::Analyze { input, output } => {
            let settings = load_settings(storage.as_ref())?;
            analyze(storage, &settings, input, output)
        }
        CliCommand::Play { notes } => {
            let settings = load_settings(storage.as_ref())?;
            play(storage.as_ref(), &settings, &notes)
        }
    }
}

fn load_settings(storage: &FsStorage) -> Result<SettingsDto> {
    storage.load_settings().with_context(|| {
        format!(
            "reading settings from {}",
            storage.base_dir().join("settings.json").display()
        )
    })
}

fn list_devices() -> Result<()> {
    let outputs = CpalAudioOutputPort::new()
        .list_outputs()
        .context("listing audio outputs")?;
    if outputs.is_empty() {
        println!("no audio outputs found");
    }
    for device in outputs {
        println!(
            "{}  ({} Hz, {} ch)  {}",
            device.id,
            device.default_config.sample_rate_hz,
            device.default_config.channels,
            device.name
        );
    }
    Ok(())
}

fn analyze(
    storage: Arc<FsStorage>,
    settings: &SettingsDto,
    input: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let segmenter = NoteSegmenter::new(segmenter_config(settings)?)?;
    let tracker = YinPitchTracker::new(TrackerConfig {
        frame_size: settings.analysis_frame_size,
        hop_size: settings.analysis_hop_size,
        ..TrackerConfig::default()
    })
    .context("invalid analysis frame/hop size")?;

    let output = output.unwrap_or_else(|| default_notes_path(&input));
    let job = AnalysisJob {
        input: input.clone(),
        output: Some(output.clone()),
    };

    let notes = spawn_analysis(Arc::new(tracker), storage, segmenter, job)?
        .wait(|message| println!("… {message}"))
        .with_context(|| format!("analysing {}", input.display()))?;

    println!("{} notes written to {}", notes.len(), output.display());
    for note in notes.iter() {
        println!(
            "  {:>6.1}s  {:<4} ({:>3})  {:.1}s",
            note.start_time(),
            note_name(note.pitch()),
            note.pitch(),
            note.duration()
        );
    }
    Ok(())
}

fn play(storage: &FsStorage, settings: &SettingsDto, path: &Path) -> Result<()> {
    let notes = storage
        .load_notes(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let config = player_config(settings)?;
    info!("loaded {} notes from {}", notes.len(), path.display());

    let audio = CpalAudioOutputPort::new();
    let mut session = PlaybackSession::open(
        notes,
        config,
        Arc::new(SimpleSynth::default()),
        &audio,
        settings.selected_audio_out.as_ref(),
        settings.sample_rate_hz,
    )
    .context("opening audio output")?;

    let events = session.subscribe();
    let printer = thread::spawn(move || {
        for event in events.iter() {
            print_event(&event);
        }
    });

    // Detached: the process exits with stdin still blocked. A closed stdin
    // (EOF) does not count as a stop request.
    let stop = session.stop_flag();
    thread::spawn(move || {
        let mut line = String::new();
        if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
            stop.request_stop();
        }
    });

    println!("press Enter to stop");
    let summary = session.run(&SystemClock::start());
    if printer.join().is_err() {
        warn!("event printer panicked");
    }

    match summary.outcome {
        PlaybackOutcome::Completed => println!(
            "done: {} played, {} skipped",
            summary.dispatched, summary.skipped
        ),
        PlaybackOutcome::Cancelled => println!(
            "stopped at note {} ({} played)",
            summary.cursor, summary.dispatched
        ),
    }
    Ok(())
}

fn print_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::Started {
            total_notes,
            total_duration,
        } => println!("playing {total_notes} notes, {total_duration:.1}s"),
        PlayerEvent::NoteDispatched {
            elapsed,
            pitch,
            frequency,
            duration,
            ..
        } => println!(
            "{elapsed:>7.2}s  {:<4} {frequency:>8.2} Hz  {duration:.1}s",
            note_name(*pitch)
        ),
        PlayerEvent::NoteSkipped { index, reason } => {
            println!("         skipped note {index}: {reason}")
        }
        PlayerEvent::Cancelled { .. } | PlayerEvent::Finished { .. } => {}
    }
}
