use std::io::{self, Write};

use lookalike_core::{
    app_config::AppConfig,
    embedding::onnx::OnnxBackbone,
    init_ort, Embedder,
};

/// Initializes the ONNX runtime and loads the configured feature extraction model.
pub fn load_embedder(config: &AppConfig) -> Result<Embedder, anyhow::Error> {
    init_ort(config.onnx_lib_dir.as_deref())?;
    let backbone = OnnxBackbone::from_config(config)?;
    Ok(Embedder::new(backbone))
}

/// Asks a yes/no question on stdin until it gets a recognizable answer.
pub fn confirm(prompt: &str) -> Result<bool, io::Error> {
    loop {
        println!("{} (Y/N)", prompt);
        io::stdout().flush()?;

        let mut confirmation = String::new();
        if io::stdin().read_line(&mut confirmation)? == 0 {
            // stdin closed, treat as a refusal
            return Ok(false);
        }

        match confirmation.trim() {
            "Y" | "y" | "yes" | "Yes" => return Ok(true),
            "N" | "n" | "no" | "No" => return Ok(false),
            _ => println!("Unrecognized input entered. Please try again."),
        }
    }
}
