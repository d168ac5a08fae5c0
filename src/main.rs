use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use tickwell::{
    Args, Command, EncodeOptions, LogSink, OutputSink, ScheduleOptions, Scheduler, compile_json,
    extract_range, read_sequence, write_artifact, write_sequence,
};

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match args.command {
        Command::Compile {
            score,
            output,
            format,
        } => {
            info!("Compiling score: '{}'...", score.display());
            let text = std::fs::read_to_string(&score)?;
            let sequence = compile_json(&text)?;

            debug!(
                "Compiled {} track(s), {} note(s) at {} ppq..!",
                sequence.tracks.len(),
                sequence.notes().count(),
                sequence.ppq
            );

            write_sequence(&output, &sequence, &EncodeOptions { format })?;
        }
        Command::Decode { midi, output } => {
            info!("Decoding MIDI file: '{}'...", midi.display());
            let sequence = read_sequence(&midi)?;
            let json = sequence.to_json()?;

            match output {
                Some(path) => write_artifact(&path, json.as_bytes())?,
                None => println!("{}", json),
            }
        }
        Command::Encode {
            sequence,
            output,
            format,
        } => {
            let sequence = read_sequence(&sequence)?;
            write_sequence(&output, &sequence, &EncodeOptions { format })?;
        }
        Command::Play {
            input,
            start_ms,
            stop_ms,
            analyze,
            lookahead_ms,
            poll_ms,
            log_sink,
            port,
            list_ports,
        } => {
            if list_ports {
                return print_ports();
            }

            let sequence = read_sequence(&input)?;
            let options = ScheduleOptions {
                start_ms,
                stop_ms,
                analyze_only: analyze,
                lookahead_ms,
                poll_ms,
            };

            play(&input, &sequence, &options, open_sink(log_sink, port))?;
        }
        Command::Extract {
            input,
            start_bar,
            end_bar,
            output,
        } => {
            let sequence = read_sequence(&input)?;
            let extraction = extract_range(&sequence, start_bar, end_bar)?;

            info!(
                "Extracted bars {}..={} in {:?} mode (ticks {}..{})..!",
                start_bar, end_bar, extraction.mode, extraction.start_tick, extraction.end_tick
            );

            write_sequence(&output, &extraction.sequence, &EncodeOptions::default())?;
        }
    }

    Ok(())
}

fn play(
    input: &Path,
    sequence: &tickwell::Sequence,
    options: &ScheduleOptions,
    sink: Option<Box<dyn OutputSink>>,
) -> Result<()> {
    let scheduler = Arc::new(Scheduler::new());
    let report = scheduler.schedule(sequence, options, sink)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let Some(id) = report.handle_id else {
        return Ok(());
    };

    info!("Playing '{}'..!", input.display());

    let scheduler_for_handler = Arc::clone(&scheduler);
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping playback..!");
        let _ = scheduler_for_handler.cancel(&id);
    })
    .expect("Error setting Ctrl-C handler..!");

    let status = scheduler.wait(&id)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    info!("Playback finished, exiting..!");

    Ok(())
}

#[cfg(feature = "device")]
fn open_sink(log_sink: bool, port: Option<String>) -> Option<Box<dyn OutputSink>> {
    if log_sink {
        return Some(Box::new(LogSink::new()));
    }

    let pattern = port.unwrap_or_default();
    match tickwell::MidirSink::open(&pattern) {
        Ok(sink) => Some(Box::new(sink)),
        Err(why) => {
            warn!("No usable MIDI output: {}", why);
            None
        }
    }
}

#[cfg(not(feature = "device"))]
fn open_sink(log_sink: bool, port: Option<String>) -> Option<Box<dyn OutputSink>> {
    if let Some(port) = port {
        warn!("Ignoring port '{}': built without the `device` feature..!", port);
    }

    if log_sink {
        Some(Box::new(LogSink::new()))
    } else {
        None
    }
}

#[cfg(feature = "device")]
fn print_ports() -> Result<()> {
    for (i, name) in tickwell::list_output_ports()?.iter().enumerate() {
        println!("{}: {}", i, name);
    }

    Ok(())
}

#[cfg(not(feature = "device"))]
fn print_ports() -> Result<()> {
    anyhow::bail!("Listing ports needs the `device` feature..!")
}
