use tracing::{debug, error};

use crate::error::QuotaError;
use crate::executor::SystemExecutor;
use crate::model::{PathSpec, QuotaRecord};
use crate::normalize::normalize;
use crate::reader::{ReadTarget, ReaderSet};
use crate::users::QuotaSubject;

pub fn parse_path_specs<S: AsRef<str>>(raw: &[S]) -> Result<Vec<PathSpec>, QuotaError> {
    raw.iter().map(|spec| PathSpec::parse(spec.as_ref())).collect()
}

pub struct QuotaCollector<E> {
    exec: E,
    readers: ReaderSet,
}

impl<E: SystemExecutor> QuotaCollector<E> {
    pub fn new(exec: E, readers: ReaderSet) -> Self {
        Self { exec, readers }
    }

    pub fn read_all_quotas(&self, subject: &QuotaSubject, specs: &[PathSpec]) -> Vec<QuotaRecord> {
        let mut records = Vec::new();
        for spec in specs {
            let Some(kind) = spec.filesystem() else {
                error!("filesystem type {} is not recognized", spec.tag);
                continue;
            };
            let target = ReadTarget {
                user: &subject.identity,
                uid: subject.uid,
                path: &spec.path,
                alias: &spec.alias,
            };
            match self.readers.reader(kind).read(&self.exec, &target) {
                Some(record) => records.push(normalize(record)),
                None => debug!(
                    "no {kind} quota for {} on {}",
                    subject.identity,
                    spec.path.display()
                ),
            }
        }
        records
    }

    pub fn collect(&self, subjects: &[QuotaSubject], specs: &[PathSpec]) -> Vec<QuotaRecord> {
        subjects
            .iter()
            .flat_map(|subject| self.read_all_quotas(subject, specs))
            .collect()
    }
}
