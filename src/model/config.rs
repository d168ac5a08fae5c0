use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tickwell",
    about = "Compile bar/beat scores to MIDI files, play them back on time, and cut out bar ranges!"
)]
pub struct Args {
    /// Prints extra information to the terminal (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a JSON score into a MIDI file (or canonical JSON with a .json output).
    Compile {
        /// Path to the score document.
        score: PathBuf,

        /// Where to write the result. Existing files are never overwritten.
        #[arg(short, long)]
        output: PathBuf,

        /// Container format to write, 0 or 1.
        #[arg(short, long)]
        format: Option<u16>,
    },

    /// Decode a MIDI file into canonical JSON.
    Decode {
        /// Path to the MIDI file.
        midi: PathBuf,

        /// Write the JSON here instead of printing it.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode a canonical JSON document into a MIDI file.
    Encode {
        /// Path to the canonical JSON document.
        sequence: PathBuf,

        /// Where to write the MIDI file. Existing files are never overwritten.
        #[arg(short, long)]
        output: PathBuf,

        /// Container format to write, 0 or 1.
        #[arg(short, long)]
        format: Option<u16>,
    },

    /// Play a MIDI file or canonical JSON document in real time.
    Play {
        /// Path to a .mid or .json document.
        input: PathBuf,

        /// Begin this many milliseconds into the document.
        #[arg(long)]
        start_ms: Option<f64>,

        /// Stop this many milliseconds into the document.
        #[arg(long)]
        stop_ms: Option<f64>,

        /// Only report event count and duration.
        #[arg(short, long, default_value_t = false)]
        analyze: bool,

        /// How far ahead each poll arms precise timers.
        #[arg(long, default_value_t = 50)]
        lookahead_ms: u64,

        /// Interval of the coarse poll.
        #[arg(long, default_value_t = 10)]
        poll_ms: u64,

        /// Print every dispatched message instead of sending it to a device.
        #[arg(long, default_value_t = false)]
        log_sink: bool,

        /// Output port name (or part of it). Needs the `device` feature.
        #[arg(short, long)]
        port: Option<String>,

        /// List the available output ports and exit. Needs the `device` feature.
        #[arg(long, default_value_t = false)]
        list_ports: bool,
    },

    /// Cut an inclusive bar range out of a document, re-based to tick 0.
    Extract {
        /// Path to a .mid or .json document.
        input: PathBuf,

        /// First bar to keep (1-based).
        start_bar: u32,

        /// Last bar to keep (1-based, inclusive).
        end_bar: u32,

        /// Where to write the excerpt (.mid or .json). Existing files are never overwritten.
        #[arg(short, long)]
        output: PathBuf,
    },
}
