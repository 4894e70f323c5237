//! Process-wide ONNX Runtime setup. Must run once before any [`crate::embedding::onnx::OnnxBackbone`]
//! is loaded.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};

#[cfg(windows)]
const RUNTIME_LIBRARY: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const RUNTIME_LIBRARY: &str = "libonnxruntime.dylib";
#[cfg(all(not(windows), not(target_os = "macos")))]
const RUNTIME_LIBRARY: &str = "libonnxruntime.so";

/// Loads ONNX Runtime and registers the execution providers embeddings run on.
///
/// With `onnx_lib_dir` the runtime library is loaded from that directory, otherwise from the
/// standard search paths. The CUDA provider comes first when the `cuda` feature is enabled; the
/// CPU provider is always registered last so inference can fall back to it.
pub fn init_ort(onnx_lib_dir: Option<&Utf8Path>) -> Result<(), anyhow::Error> {
    let providers = execution_providers();
    let provider_names: Vec<&str> = providers.iter().map(|(name, _)| *name).collect();
    let dispatches: Vec<ExecutionProviderDispatch> = providers.into_iter().map(|(_, ep)| ep).collect();

    let builder = match onnx_lib_dir {
        Some(dir) => {
            let library = runtime_library_path(dir);
            if !library.is_file() {
                warn!("ONNX Runtime library not found at {}, loading will likely fail", library);
            }
            debug!("Loading ONNX Runtime from {}", library);
            ort::init_from(library.as_str())
        },
        None => ort::init(),
    };

    builder.with_execution_providers(dispatches)
        .commit()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to initialize ONNX Runtime")?;

    info!("ONNX Runtime ready, execution providers in preference order: {}", provider_names.join(", "));
    Ok(())
}

/// Full path of the platform's ONNX Runtime dynamic library inside `dir`.
pub fn runtime_library_path(dir: &Utf8Path) -> Utf8PathBuf {
    dir.join(RUNTIME_LIBRARY)
}

// Private functions

fn execution_providers() -> Vec<(&'static str, ExecutionProviderDispatch)> {
    let mut providers = vec![];
    #[cfg(feature = "cuda")]
    providers.push(("CUDA", ort::execution_providers::CUDAExecutionProvider::default().build()));
    providers.push(("CPU", CPUExecutionProvider::default().build()));
    providers
}
