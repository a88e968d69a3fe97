//! In-process ONNX Runtime backend for the three anomaly models

use crate::feature_extractor::FeatureVector;
use crate::models::adapters::{fit_width, mean_squared_error, ModelKind};
use crate::models::backend::{BackendError, RawModelOutputs, ScoringBackend};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Tensor, ValueType};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// File names of the three model artifacts inside the models directory
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub autoencoder: String,
    pub isolation_forest: String,
    pub gnn: String,
}

/// One loaded ONNX session and its I/O layout
struct OnnxModel {
    kind: ModelKind,
    session: Session,
    input_name: String,
    /// Declared feature width of the first input, when static
    input_width: Option<usize>,
    /// Second input of graph models (`edge_index`)
    edge_input: Option<String>,
    output_name: String,
}

impl OnnxModel {
    fn load(path: &Path, kind: ModelKind, threads: usize) -> Result<Self> {
        info!(model = %kind, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let input_width = session.inputs.first().and_then(|i| match &i.input_type {
            ValueType::Tensor { shape, .. } => shape
                .last()
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as usize),
            _ => None,
        });

        let edge_input = match kind {
            ModelKind::Graph => session.inputs.get(1).map(|i| i.name.clone()),
            _ => None,
        };

        // isolation forests export [label, scores]; the decision score is what we want
        let preferred = match kind {
            ModelKind::Isolation => "score",
            _ => "output",
        };
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains(preferred))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output".to_string());

        info!(
            model = %kind,
            input = %input_name,
            input_width = ?input_width,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            kind,
            session,
            input_name,
            input_width,
            edge_input,
            output_name,
        })
    }

    /// Run the session on a `[1, n]` input and return the named output
    fn run(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = vec![1_i64, input.len() as i64];
        let input_tensor =
            Tensor::from_array((shape, input)).context("Failed to create input tensor")?;

        let outputs = match &self.edge_input {
            Some(edge_name) => {
                // single node, no neighbours
                let edges = Tensor::from_array((vec![2_i64, 0], Vec::<i64>::new()))
                    .context("Failed to create edge index tensor")?;
                self.session.run(ort::inputs![
                    &self.input_name => input_tensor,
                    edge_name => edges
                ])?
            }
            None => self
                .session
                .run(ort::inputs![&self.input_name => input_tensor])?,
        };

        let output = outputs
            .get(&self.output_name)
            .context(format!("Missing output {}", self.output_name))?;
        let (_shape, data) = output.try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    fn raw_score(&mut self, features: &[f32]) -> Result<Option<f64>> {
        match self.kind {
            ModelKind::Reconstruction => {
                let reconstruction = self.run(features.to_vec())?;
                Ok(mean_squared_error(features, &reconstruction))
            }
            ModelKind::Isolation => {
                let scores = self.run(features.to_vec())?;
                Ok(scores.first().map(|&d| d as f64))
            }
            ModelKind::Graph => {
                let width = self.input_width.unwrap_or(features.len());
                let probabilities = self.run(fit_width(features, width))?;
                Ok(probabilities.last().map(|&p| p as f64))
            }
        }
    }
}

struct LoadedModels {
    reconstruction: Option<RwLock<OnnxModel>>,
    isolation: Option<RwLock<OnnxModel>>,
    graph: Option<RwLock<OnnxModel>>,
}

impl LoadedModels {
    fn infer(&self, features: &[f32]) -> RawModelOutputs {
        RawModelOutputs {
            reconstruction_mse: run_slot(&self.reconstruction, features),
            isolation_decision: run_slot(&self.isolation, features),
            graph_sigmoid: run_slot(&self.graph, features),
            model_confidence: None,
        }
    }
}

/// A missing model, or a failed run, leaves that model unavailable
fn run_slot(slot: &Option<RwLock<OnnxModel>>, features: &[f32]) -> Option<f64> {
    let mut model = slot.as_ref()?.write();
    match model.raw_score(features) {
        Ok(score) => score,
        Err(e) => {
            error!(model = %model.kind, error = %e, "Model inference failed");
            None
        }
    }
}

/// Runs the models on the blocking pool; each model loads independently.
pub struct OnnxBackend {
    models: Arc<LoadedModels>,
}

impl OnnxBackend {
    pub fn load<P: AsRef<Path>>(models_dir: P, files: &ModelFiles, threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = threads, "ONNX Runtime initialized");

        let dir = models_dir.as_ref();
        let load = |kind: ModelKind, file: &str| -> Option<RwLock<OnnxModel>> {
            let path = dir.join(file);
            if !path.exists() {
                warn!(model = %kind, path = %path.display(), "Model file not found");
                return None;
            }
            match OnnxModel::load(&path, kind, threads) {
                Ok(model) => Some(RwLock::new(model)),
                Err(e) => {
                    warn!(model = %kind, error = %e, "Failed to load model, skipping");
                    None
                }
            }
        };

        let models = LoadedModels {
            reconstruction: load(ModelKind::Reconstruction, &files.autoencoder),
            isolation: load(ModelKind::Isolation, &files.isolation_forest),
            graph: load(ModelKind::Graph, &files.gnn),
        };

        let backend = Self {
            models: Arc::new(models),
        };
        let loaded = backend.loaded_models();
        if loaded.is_empty() {
            warn!(dir = %dir.display(), "No models loaded, scoring falls back to heuristics");
        } else {
            info!(models = ?loaded, "Loaded {} models from {}", loaded.len(), dir.display());
        }

        Ok(backend)
    }

    pub fn loaded_models(&self) -> Vec<ModelKind> {
        [
            (ModelKind::Reconstruction, self.models.reconstruction.is_some()),
            (ModelKind::Isolation, self.models.isolation.is_some()),
            (ModelKind::Graph, self.models.graph.is_some()),
        ]
        .into_iter()
        .filter_map(|(kind, loaded)| loaded.then_some(kind))
        .collect()
    }
}

#[async_trait]
impl ScoringBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    async fn infer(&self, features: &FeatureVector) -> Result<RawModelOutputs, BackendError> {
        let models = self.models.clone();
        let input = features.as_slice().to_vec();

        match tokio::task::spawn_blocking(move || models.infer(&input)).await {
            Ok(outputs) => {
                debug!(outputs = ?outputs, "ONNX inference complete");
                Ok(outputs)
            }
            Err(e) => {
                // a panicking session only takes its own results down
                error!(error = %e, "ONNX inference task failed");
                Ok(RawModelOutputs::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FEATURE_COUNT;

    fn files() -> ModelFiles {
        ModelFiles {
            autoencoder: "autoencoder.onnx".to_string(),
            isolation_forest: "isolation_forest.onnx".to_string(),
            gnn: "gnn.onnx".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_models_dir_leaves_every_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = OnnxBackend::load(dir.path(), &files(), 1).unwrap();
        assert!(backend.loaded_models().is_empty());

        let vector = FeatureVector::from_values([1.0; FEATURE_COUNT]);
        let outputs = backend.infer(&vector).await.unwrap();
        assert_eq!(outputs, RawModelOutputs::default());
    }

    #[tokio::test]
    async fn test_corrupt_model_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gnn.onnx"), b"not an onnx graph").unwrap();

        let backend = OnnxBackend::load(dir.path(), &files(), 1).unwrap();
        assert!(backend.loaded_models().is_empty());
    }
}
