/// Preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU when a listed provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Backend identifier reported in `modelReady`.
pub fn backend_name() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "coreml"
    }
    #[cfg(target_os = "windows")]
    {
        "directml"
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        "cpu"
    }
}

/// Starts an ONNX session builder with the platform providers applied.
pub fn session_builder(
) -> Result<ort::session::builder::SessionBuilder, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let builder = ort::session::Session::builder()?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?;
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_matches_providers() {
        let providers = preferred_execution_providers();
        if providers.is_empty() {
            assert_eq!(backend_name(), "cpu");
        } else {
            assert_ne!(backend_name(), "cpu");
        }
    }
}
