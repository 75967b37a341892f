use std::{path::Path, sync::Mutex};

use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};

use crate::{
    error::{InferenceError, ModelLoadError},
    preprocess::ImageTensor,
};

/// Binary classifier producing the positive-class probability for one image.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &ImageTensor) -> Result<f64, InferenceError>;
}

struct Runtime {
    session: Session,
    graph: Graph,
}

/// Frozen TensorFlow graph with a `[1, 150, 150, 3]` input and a single
/// sigmoid output.
pub struct Model {
    runtime: Mutex<Runtime>,
    input_op: String,
    output_op: String,
}

impl Model {
    pub fn load(
        model_path: &Path,
        input_op: &str,
        output_op: &str,
    ) -> Result<Self, ModelLoadError> {
        let model_bytes = std::fs::read(model_path)?;

        let mut graph = Graph::new();
        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        // Fail at startup rather than on the first request.
        for name in [input_op, output_op] {
            if graph
                .operation_by_name(name)
                .map_err(tensorflow::Status::from)?.is_none() {
                return Err(ModelLoadError::MissingOperation(name.to_string()));
            }
        }

        let session = Session::new(&SessionOptions::new(), &graph)?;

        Ok(Model {
            runtime: Mutex::new(Runtime { session, graph }),
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }
}

impl Classifier for Model {
    fn predict(&self, input: &ImageTensor) -> Result<f64, InferenceError> {
        let mut input_tensor = Tensor::<f32>::new(&ImageTensor::BATCH_DIMS);
        input_tensor.copy_from_slice(input.as_slice());

        let runtime = self
            .runtime
            .lock()
            .map_err(|_| InferenceError::Worker("model runtime lock poisoned".into()))?;

        let input_operation = runtime
            .graph
            .operation_by_name(&self.input_op)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| InferenceError::MissingOperation(self.input_op.clone()))?;
        let output_operation = runtime
            .graph
            .operation_by_name(&self.output_op)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| InferenceError::MissingOperation(self.output_op.clone()))?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        runtime.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        let probability = output_tensor
            .first()
            .copied()
            .ok_or(InferenceError::EmptyOutput)?;

        Ok(f64::from(probability))
    }
}
