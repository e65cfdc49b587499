//! Session construction and tensor binding on the provisioned accelerator.

use tracing::debug;

use crate::engine::{
    AcceleratorContext, EngineError, InferenceEngine, MemoryLocation, Model, Session,
    SessionOptions, Tensor,
};

/// Something the benchmark loop can submit once per iteration.
pub trait Workload {
    /// Queue one unit of device work. Must not wait for it to finish.
    fn submit(&mut self) -> Result<(), EngineError>;
}

/// Accelerator-resident tensors for the model's first input and output.
#[derive(Debug)]
pub struct BoundTensors {
    pub input: Tensor,
    pub output: Tensor,
}

/// A session bound to one accelerator context, plus its bound tensors.
#[derive(Debug)]
pub struct InferenceSessionAdapter {
    session: Box<dyn Session>,
    bound: Option<BoundTensors>,
}

impl InferenceSessionAdapter {
    /// Build a session for `model` on `context`.
    pub fn create_session(
        engine: &dyn InferenceEngine,
        model: &dyn Model,
        options: &SessionOptions,
        context: &AcceleratorContext,
    ) -> Result<Self, EngineError> {
        let session = engine.create_session(model, options, context)?;
        Ok(Self { session, bound: None })
    }

    /// Allocate accelerator-resident tensors for the first declared input and
    /// output. Further inputs and outputs are ignored. Rebinding replaces the
    /// previous tensors.
    pub fn bind(&mut self) -> Result<&BoundTensors, EngineError> {
        let input_info = self
            .session
            .inputs()
            .first()
            .cloned()
            .ok_or(EngineError::MissingBinding { kind: "input" })?;
        let output_info = self
            .session
            .outputs()
            .first()
            .cloned()
            .ok_or(EngineError::MissingBinding { kind: "output" })?;

        let input = self.session.allocate_tensor(&input_info, MemoryLocation::Accelerator)?;
        let output = self.session.allocate_tensor(&output_info, MemoryLocation::Accelerator)?;
        debug!(
            input = %input_info.name,
            input_bytes = input.byte_len(),
            output = %output_info.name,
            output_bytes = output.byte_len(),
            "bound accelerator tensors"
        );
        Ok(self.bound.insert(BoundTensors { input, output }))
    }

    pub fn bound(&self) -> Option<&BoundTensors> {
        self.bound.as_ref()
    }

    /// Copy the bound output back to the host.
    ///
    /// The output must live on the session's own device and hold exactly the
    /// bytes its static shape declares.
    pub fn read_output(&self) -> Result<Vec<u8>, EngineError> {
        let bound = self.bound.as_ref().ok_or(EngineError::MissingBinding { kind: "output" })?;
        let output = &bound.output;
        let device_id = self.session.context().device().id();
        let buffer = output
            .device_buffer()
            .filter(|buffer| buffer.device_id() == device_id)
            .ok_or_else(|| EngineError::NotAcceleratorResident {
                tensor: output.name().to_string(),
            })?;

        let bytes = buffer.read_to_vec();
        let expected = output.info().byte_len();
        if expected != Some(bytes.len()) {
            return Err(EngineError::Incompatible(format!(
                "output `{}` read back {} bytes, expected {:?}",
                output.name(),
                bytes.len(),
                expected
            )));
        }
        Ok(bytes)
    }

    /// Submit one inference over the bound tensors.
    pub fn run(&mut self) -> Result<(), EngineError> {
        let bound = self.bound.as_ref().ok_or(EngineError::MissingBinding { kind: "input" })?;
        self.session.run(&[&bound.input], &[&bound.output])
    }
}

impl Workload for InferenceSessionAdapter {
    fn submit(&mut self) -> Result<(), EngineError> {
        self.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference_engine::ReferenceEngine;
    use accelbench_backend::reference::ReferenceBackend;
    use accelbench_backend::{ComputeBackend, FeatureLevel, QueueKind};
    use std::io::Write;
    use std::time::Duration;

    fn context(backend: &ReferenceBackend, engine: &ReferenceEngine) -> AcceleratorContext {
        let adapter = backend.enumerate_adapters(&[]).unwrap().remove(1);
        let device = backend.create_device(&adapter, FeatureLevel::Core1_0).unwrap();
        let queue = device.create_queue(QueueKind::Compute).unwrap();
        engine.create_accelerator_context(device, queue).unwrap()
    }

    fn two_input_model() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{ "name": "pair",
                  "inputs":  [{ "name": "a", "element_type": "f32", "shape": [2, 2] },
                              { "name": "b", "element_type": "f32", "shape": [8] }],
                  "outputs": [{ "name": "y", "element_type": "f16", "shape": [3] }] }"#,
        )
        .unwrap();
        file
    }

    #[test]
    fn bind_uses_first_input_and_output_only() {
        let backend = ReferenceBackend::default_topology();
        let engine = ReferenceEngine::new();
        let ctx = context(&backend, &engine);
        let file = two_input_model();
        let model = engine.open_model(file.path()).unwrap();
        let mut adapter = InferenceSessionAdapter::create_session(
            &engine,
            model.as_ref(),
            &SessionOptions::default(),
            &ctx,
        )
        .unwrap();

        let bound = adapter.bind().unwrap();
        assert_eq!(bound.input.name(), "a");
        assert_eq!(bound.input.byte_len(), 16);
        assert_eq!(bound.output.name(), "y");
        assert_eq!(bound.output.byte_len(), 6);
        assert_eq!(bound.input.location(), MemoryLocation::Accelerator);
        assert_eq!(bound.output.location(), MemoryLocation::Accelerator);
    }

    #[test]
    fn output_reads_back_after_run() {
        let backend = ReferenceBackend::default_topology();
        let engine = ReferenceEngine::new();
        let ctx = context(&backend, &engine);
        let file = two_input_model();
        let model = engine.open_model(file.path()).unwrap();
        let mut adapter = InferenceSessionAdapter::create_session(
            &engine,
            model.as_ref(),
            &SessionOptions::default(),
            &ctx,
        )
        .unwrap();

        assert!(matches!(
            adapter.read_output().unwrap_err(),
            EngineError::MissingBinding { kind: "output" }
        ));
        adapter.bind().unwrap();
        adapter.run().unwrap();
        let fence = ctx.device().create_fence(0).unwrap();
        ctx.queue().signal(&fence, 1).unwrap();
        assert!(fence.wait_for(1, Some(Duration::from_secs(5))));

        assert_eq!(adapter.read_output().unwrap().len(), 6);
    }

    #[test]
    fn host_output_is_not_read_back() {
        let backend = ReferenceBackend::default_topology();
        let engine = ReferenceEngine::new();
        let ctx = context(&backend, &engine);
        let file = two_input_model();
        let model = engine.open_model(file.path()).unwrap();
        let mut adapter = InferenceSessionAdapter::create_session(
            &engine,
            model.as_ref(),
            &SessionOptions::default(),
            &ctx,
        )
        .unwrap();

        let (input, output) = {
            let bound = adapter.bind().unwrap();
            (bound.input.info().clone(), bound.output.info().clone())
        };
        adapter.bound = Some(BoundTensors {
            input: Tensor::host(input, 16),
            output: Tensor::host(output, 6),
        });
        assert!(matches!(
            adapter.read_output().unwrap_err(),
            EngineError::NotAcceleratorResident { tensor } if tensor == "y"
        ));
    }

    #[test]
    fn run_before_bind_is_an_error() {
        let backend = ReferenceBackend::default_topology();
        let engine = ReferenceEngine::new();
        let ctx = context(&backend, &engine);
        let file = two_input_model();
        let model = engine.open_model(file.path()).unwrap();
        let mut adapter = InferenceSessionAdapter::create_session(
            &engine,
            model.as_ref(),
            &SessionOptions::default(),
            &ctx,
        )
        .unwrap();
        assert!(matches!(adapter.run().unwrap_err(), EngineError::MissingBinding { .. }));
        adapter.bind().unwrap();
        adapter.run().unwrap();
    }
}
