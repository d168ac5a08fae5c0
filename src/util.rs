use crate::codec::{EncodeOptions, decode, encode_with};
use crate::model::sequence::Sequence;
use anyhow::{Context, bail};
use log::{debug, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

pub fn is_json_path(path: &Path) -> bool {
    has_extension(path, &["json"])
}

/// Load a document from a `.json` canonical file or any Standard MIDI File.
pub fn read_sequence(path: &Path) -> anyhow::Result<Sequence> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;

    if is_json_path(path) {
        let text = String::from_utf8(bytes)?;
        let sequence = Sequence::from_json(&text)?;
        debug!("Loaded canonical JSON '{}'", path.display());
        return Ok(sequence);
    }

    if !bytes.starts_with(b"MThd") && !has_extension(path, &["mid", "midi", "smf"]) {
        bail!("'{}' is neither a .json document nor a MIDI file..!", path.display());
    }

    Ok(decode(&bytes)?)
}

/// Write a new artifact. An existing file at `path` is an error, never overwritten.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Refusing to write '{}'", path.display()))?;

    file.write_all(bytes)?;
    file.flush()?;

    info!("Wrote {} bytes to '{}'..!", bytes.len(), path.display());

    Ok(())
}

/// Write `sequence` as canonical JSON or as a MIDI file, chosen by extension.
pub fn write_sequence(path: &Path, sequence: &Sequence, options: &EncodeOptions) -> anyhow::Result<()> {
    if is_json_path(path) {
        write_artifact(path, sequence.to_json()?.as_bytes())
    } else {
        write_artifact(path, &encode_with(sequence, options))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::sequence::{Event, Note, Track};
    use std::path::PathBuf;

    fn scratch(extension: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tickwell-{}.{}", uuid::Uuid::new_v4(), extension))
    }

    fn sample() -> Sequence {
        let mut sequence = Sequence::new(1, 96);
        sequence.tracks.push(Track {
            name: Some(String::from("Solo")),
            channel: Some(0),
            events: vec![Event::Note(Note {
                tick: 0,
                pitch: 69,
                velocity: 64,
                duration: 96,
                channel: 0,
                name: None,
            })],
        });
        sequence
    }

    #[test]
    fn artifacts_are_never_overwritten() {
        let path = scratch("bin");

        write_artifact(&path, b"first").unwrap();
        assert!(write_artifact(&path, b"second").is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn sequences_round_trip_through_either_format() {
        for extension in ["mid", "json"] {
            let path = scratch(extension);

            write_sequence(&path, &sample(), &EncodeOptions::default()).unwrap();
            let loaded = read_sequence(&path).unwrap();

            assert_eq!(loaded.notes().count(), 1);
            assert_eq!(loaded.tracks[0].name.as_deref(), Some("Solo"));

            std::fs::remove_file(&path).unwrap();
        }
    }
}
