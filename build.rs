// Compiles the GLSL stages in shaders/ to SPIR-V next to their sources.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_DIR: &str = "shaders";
const STAGES: [&str; 2] = ["basic.vert", "basic.frag"];

/// `GLSLC` wins, then the Vulkan SDK's copy, then whatever is on `PATH`.
fn find_glslc() -> PathBuf {
    if let Ok(glslc) = env::var("GLSLC") {
        return PathBuf::from(glslc);
    }

    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let candidate = Path::new(&sdk).join("bin").join("glslc");
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from("glslc")
}

fn is_stale(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src), Ok(out)) => match (src.modified(), out.modified()) {
            (Ok(src), Ok(out)) => src > out,
            _ => true,
        },
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=GLSLC");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        return;
    }

    let glslc = find_glslc();

    for stage in STAGES {
        let source = Path::new(SHADER_DIR).join(stage);
        let output = Path::new(SHADER_DIR).join(format!("{stage}.spv"));
        println!("cargo:rerun-if-changed={}", source.display());

        if !is_stale(&source, &output) {
            continue;
        }

        match Command::new(&glslc).arg(&source).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                println!(
                    "cargo:warning=glslc failed on {} ({}), {} will be missing at runtime",
                    source.display(),
                    status,
                    output.display()
                );
            }
            Err(e) => {
                println!(
                    "cargo:warning=could not run {} ({}); compile {} by hand or set GLSLC",
                    glslc.display(),
                    e,
                    source.display()
                );
            }
        }
    }
}
