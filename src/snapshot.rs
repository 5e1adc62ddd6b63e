//! Run state at the end of an iteration, stored as JSON so a run can be resumed from it.

use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::person::Person;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The last completed iteration.
    pub iteration: i64,
    pub base_seed: u64,
    /// Remaining global budget of initial infections.
    pub infections_left: u64,
    pub persons: Vec<Person>,
}

impl Snapshot {
    #[must_use]
    pub fn file_name(iteration: i64) -> String {
        format!("episim-snapshot-{iteration:03}.json")
    }

    /// Writes the snapshot into `directory` and returns the file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub fn write(&self, directory: &Path) -> Result<PathBuf, EpisimError> {
        create_dir_all(directory)?;
        let path = directory.join(Self::file_name(self.iteration));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!("wrote snapshot {}", path.display());
        Ok(path)
    }

    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed.
    pub fn read(path: &Path) -> Result<Self, EpisimError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
