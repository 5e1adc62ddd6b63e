use crate::error::EpisimError;
use crate::hashing::{HashMap, HashMapExt};
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // File stem of the report, without prefix and extension
    fn name() -> &'static str
    where
        Self: Sized;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), EpisimError>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! define_report {
    ($name:ident, $file_name:literal) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn name() -> &'static str {
                $file_name
            }

            fn serialize(
                &self,
                writer: &mut csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::error::EpisimError> {
                writer.serialize(self)?;
                Ok(())
            }
        }
    };
}
pub use define_report;

/// Where report files go: `<directory>/<file_prefix><name>.csv`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportOptions {
    pub directory: PathBuf,
    pub file_prefix: String,
    /// Replace existing files instead of failing.
    pub overwrite: bool,
}

impl ReportOptions {
    #[must_use]
    pub fn new(directory: &Path) -> Self {
        ReportOptions {
            directory: directory.to_path_buf(),
            file_prefix: String::new(),
            overwrite: false,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, file_prefix: &str) -> Self {
        self.file_prefix = file_prefix.to_string();
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}.csv", self.file_prefix, name))
    }
}

// Creates the file and all parent directories if they do not exist. Fails if the file exists
// and overwriting is off.
fn open_report_file(path: &Path, overwrite: bool) -> Result<File, EpisimError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::AlreadyExists {
            EpisimError::ReportError(format!(
                "{} already exists, enable overwrite to replace it",
                path.display()
            ))
        } else {
            error.into()
        }
    })
}

/// The report writers of a run, one CSV file per report type.
pub struct Reports {
    options: ReportOptions,
    file_writers: HashMap<TypeId, Writer<File>>,
}

impl Reports {
    #[must_use]
    pub fn new(options: ReportOptions) -> Self {
        Reports {
            options,
            file_writers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Opens the file of report type `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be created, or exists and overwriting is off.
    pub fn add_report<T: Report>(&mut self) -> Result<(), EpisimError> {
        let file = open_report_file(&self.options.path(T::name()), self.options.overwrite)?;
        self.file_writers
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(())
    }

    /// Write a new row with columns following items in the report struct
    /// to the report file associated with the report type struct.
    ///
    /// # Errors
    ///
    /// Returns [`EpisimError::ReportError`] if no file was opened for the report type, or the
    /// row can't be written.
    pub fn send_report<T: Report>(&mut self, report: &T) -> Result<(), EpisimError> {
        let writer = self
            .file_writers
            .get_mut(&report.type_id())
            .ok_or_else(|| EpisimError::ReportError(format!("No writer found for {}", T::name())))?;
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Persons per status at the end of an iteration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseStatusReport {
    pub iteration: i64,
    pub date: String,
    pub susceptible: usize,
    pub infected_but_not_contagious: usize,
    pub contagious: usize,
    pub showing_symptoms: usize,
    pub critical: usize,
    pub recovered: usize,
    pub deceased: usize,
    pub quarantined: usize,
    pub vaccinated: usize,
    pub boosted: usize,
}
define_report!(DiseaseStatusReport, "disease_status");

/// New infections of one strain in an iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrainInfectionsReport {
    pub iteration: i64,
    pub date: String,
    pub strain: String,
    pub seeded: usize,
    pub infections: usize,
}
define_report!(StrainInfectionsReport, "strain_infections");

/// Doses of one vaccine type handed out in an iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationReport {
    pub iteration: i64,
    pub date: String,
    pub campaign: String,
    pub vaccine: String,
    pub doses: usize,
}
define_report!(VaccinationReport, "vaccinations");

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize)]
    struct SampleReport {
        id: u32,
        value: String,
    }

    define_report!(SampleReport, "sample_report");

    #[test]
    fn add_and_send_report() {
        let temp_dir = tempdir().unwrap();
        let mut reports = Reports::new(ReportOptions::new(temp_dir.path()));
        reports.add_report::<SampleReport>().unwrap();
        reports
            .send_report(&SampleReport {
                id: 1,
                value: "Test Value".to_string(),
            })
            .unwrap();

        let file_path = temp_dir.path().join("sample_report.csv");
        assert!(file_path.exists(), "CSV file should exist");

        let mut reader = csv::Reader::from_path(file_path).unwrap();
        for result in reader.deserialize() {
            let record: SampleReport = result.unwrap();
            assert_eq!(record.id, 1);
            assert_eq!(record.value, "Test Value");
        }
    }

    #[test]
    fn directory_creation_and_prefix() {
        let temp_dir = tempdir().unwrap();
        let options = ReportOptions::new(&temp_dir.path().join("test-temp")).with_prefix("run1_");
        let mut reports = Reports::new(options);
        reports.add_report::<SampleReport>().unwrap();
        assert!(temp_dir
            .path()
            .join("test-temp")
            .join("run1_sample_report.csv")
            .exists());
    }

    #[test]
    fn existing_file_needs_overwrite() {
        let temp_dir = tempdir().unwrap();
        let mut reports = Reports::new(ReportOptions::new(temp_dir.path()));
        reports.add_report::<SampleReport>().unwrap();

        let mut again = Reports::new(ReportOptions::new(temp_dir.path()));
        assert!(matches!(
            again.add_report::<SampleReport>(),
            Err(EpisimError::ReportError(_))
        ));

        let mut overwriting =
            Reports::new(ReportOptions::new(temp_dir.path()).with_overwrite(true));
        overwriting.add_report::<SampleReport>().unwrap();
    }

    #[test]
    fn send_report_without_adding_report() {
        let temp_dir = tempdir().unwrap();
        let mut reports = Reports::new(ReportOptions::new(temp_dir.path()));
        let result = reports.send_report(&SampleReport {
            id: 1,
            value: "Test Value".to_string(),
        });
        assert!(matches!(result, Err(EpisimError::ReportError(_))));
        assert!(!temp_dir.path().join("sample_report.csv").exists());
    }

    #[test]
    fn multiple_rows_are_quoted() {
        let temp_dir = tempdir().unwrap();
        let mut reports = Reports::new(ReportOptions::new(temp_dir.path()));
        reports.add_report::<SampleReport>().unwrap();
        reports
            .send_report(&SampleReport {
                id: 1,
                value: "Value,1".to_string(),
            })
            .unwrap();
        reports
            .send_report(&SampleReport {
                id: 2,
                value: "Value\n2".to_string(),
            })
            .unwrap();

        let mut reader = csv::Reader::from_path(temp_dir.path().join("sample_report.csv"))
            .expect("Failed to open CSV file");
        let records: Vec<SampleReport> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("Failed to deserialize record");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, "Value,1");
        assert_eq!(records[1].value, "Value\n2");
    }

    #[test]
    fn multithreaded_report_generation_thread_local() {
        let num_threads = 10;
        let num_reports_per_thread = 5;

        let mut handles = vec![];
        let temp_dir = tempdir().unwrap();
        // needs to be owned in this test
        let base_path = temp_dir.path().to_path_buf();

        for i in 0..num_threads {
            let path = base_path.clone();
            let handle = thread::spawn(move || {
                let options = ReportOptions::new(&path).with_prefix(&format!("{i}"));
                let mut reports = Reports::new(options);
                reports.add_report::<SampleReport>().unwrap();

                for j in 0..num_reports_per_thread {
                    let report = SampleReport {
                        id: u32::try_from(i * num_reports_per_thread + j).unwrap(),
                        value: format!("Thread {i} Report {j}"),
                    };
                    reports.send_report(&report).unwrap();
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            handle.join().expect("Thread failed");
        }

        for i in 0..num_threads {
            let file_path = base_path.join(format!("{i}sample_report.csv"));
            assert!(file_path.exists(), "CSV file should exist");

            let mut reader = csv::Reader::from_path(file_path).expect("Failed to open CSV file");
            for (j, record) in reader.deserialize::<SampleReport>().enumerate() {
                let record = record.expect("Failed to deserialize record");
                assert_eq!(record.id, u32::try_from(i * num_reports_per_thread + j).unwrap());
            }
        }
    }
}
