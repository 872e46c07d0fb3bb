//! In-memory recorder.

use async_trait::async_trait;
use chrono::Utc;

use super::{Dataset, DatasetSchema, Recorder, RunId, RunStatus, SweepPoint};
use crate::error::{AppResult, DaqError};
use crate::metadata::Metadata;

/// Keeps every run in memory. Run ids count up from 1.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    datasets: Vec<Dataset>,
    current: Option<usize>,
}

impl MemoryRecorder {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All runs, oldest first.
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// Most recent run.
    pub fn last(&self) -> Option<&Dataset> {
        self.datasets.last()
    }

    /// Run by id.
    pub fn dataset(&self, run_id: RunId) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.run_id == run_id)
    }

    fn current_mut(&mut self) -> AppResult<&mut Dataset> {
        let index = self
            .current
            .ok_or_else(|| DaqError::Storage("no run in progress".to_string()))?;
        self.datasets
            .get_mut(index)
            .ok_or_else(|| DaqError::Storage("run in progress vanished".to_string()))
    }
}

#[async_trait]
impl Recorder for MemoryRecorder {
    async fn begin(&mut self, schema: &DatasetSchema, metadata: &Metadata) -> AppResult<RunId> {
        if self.current.is_some() {
            return Err(DaqError::Storage("a run is already in progress".to_string()));
        }
        let run_id = RunId::new(self.datasets.len() as u64 + 1);
        self.datasets.push(Dataset {
            run_id,
            schema: schema.clone(),
            metadata: metadata.clone(),
            started: Utc::now(),
            status: RunStatus::Running,
            points: Vec::with_capacity(schema.expected_points()),
        });
        self.current = Some(self.datasets.len() - 1);
        Ok(run_id)
    }

    async fn record(&mut self, point: &SweepPoint) -> AppResult<()> {
        self.current_mut()?.points.push(point.clone());
        Ok(())
    }

    async fn finish(&mut self, status: RunStatus) -> AppResult<()> {
        self.current_mut()?.status = status;
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AxisInfo, Direction};
    use crate::instrument::Reading;

    fn schema() -> DatasetSchema {
        DatasetSchema {
            measurement_name: "test".into(),
            experiment: None,
            outer: AxisInfo {
                name: "outer".into(),
                unit: "V".into(),
                values: vec![0.0],
            },
            inner: AxisInfo {
                name: "inner".into(),
                unit: "V".into(),
                values: vec![0.0],
            },
            observables: vec![],
            retrace: false,
        }
    }

    #[tokio::test]
    async fn run_ids_increase_and_runs_do_not_overlap() {
        let mut recorder = MemoryRecorder::new();
        let first = recorder.begin(&schema(), &Metadata::default()).await.unwrap();
        assert!(recorder.begin(&schema(), &Metadata::default()).await.is_err());
        recorder
            .record(&SweepPoint {
                outer_index: 0,
                inner_index: 0,
                outer: 0.0,
                inner: 0.0,
                direction: Direction::Forward,
                readings: vec![Reading::scalar(1.0)],
            })
            .await
            .unwrap();
        recorder.finish(RunStatus::Completed).await.unwrap();

        let second = recorder.begin(&schema(), &Metadata::default()).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert_ne!(first.guid, second.guid);
        assert!(recorder.dataset(first).is_some_and(Dataset::is_complete));
    }

    #[tokio::test]
    async fn record_without_run_fails() {
        let mut recorder = MemoryRecorder::new();
        assert!(recorder.finish(RunStatus::Completed).await.is_err());
    }
}
