// Compile the GLSL shaders into SPIR-V
//
// Every `shaders/*.vert` and `shaders/*.frag` is turned into a
// `<name>.spv` file in OUT_DIR, and the directory is exported as
// SQUALL_SHADER_DIR so the crate knows where to load them from.
// If glslangValidator is not installed we only warn, users can then
// point SQUALL_SHADER_DIR at prebuilt shaders at runtime.
extern crate utils;

use std::path::{Path, PathBuf};
use std::process::Command;
use utils::{anyhow, Context, Result};

const SHADER_DIR: &str = "shaders";

fn compile_shader(src: &Path, out_dir: &Path) -> Result<()> {
    let name = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(anyhow!("Invalid shader file name {:?}", src))?;
    let dst = out_dir.join(format!("{}.spv", name));

    let status = Command::new("glslangValidator")
        .arg("-V")
        .arg(src)
        .arg("-o")
        .arg(&dst)
        .status()
        .context("Could not launch glslangValidator")?;

    if !status.success() {
        return Err(anyhow!("glslangValidator failed on {:?}", src));
    }
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").context("OUT_DIR not set")?);
    println!("cargo:rerun-if-changed={}", SHADER_DIR);
    println!("cargo:rustc-env=SQUALL_SHADER_DIR={}", out_dir.display());

    for entry in std::fs::read_dir(SHADER_DIR).context("Could not open shader directory")? {
        let path = entry?.path();
        let is_shader = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("vert") | Some("frag")
        );
        if !is_shader {
            continue;
        }

        println!("cargo:rerun-if-changed={}", path.display());
        if let Err(e) = compile_shader(&path, &out_dir) {
            println!("cargo:warning=Skipping shader {}: {:#}", path.display(), e);
        }
    }

    Ok(())
}
