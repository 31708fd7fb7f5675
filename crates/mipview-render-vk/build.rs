// SPDX-License-Identifier: CEPL-1.0
use std::{env, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=shaders/quad.vert");
    println!("cargo:rerun-if-changed=shaders/quad.frag");

    #[cfg(feature = "build-shaders")]
    compile::run();
}

/// `target/<profile>/shaders`: OUT_DIR is `target/<profile>/build/<pkg>-<hash>/out`.
#[allow(dead_code)]
fn shader_output_dir() -> PathBuf {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    out.ancestors()
        .nth(3)
        .map(|profile| profile.join("shaders"))
        .unwrap_or_else(|| out.join("shaders"))
}

#[cfg(feature = "build-shaders")]
mod compile {
    use std::{fs, path::Path};

    pub fn run() {
        let dst = super::shader_output_dir();
        fs::create_dir_all(&dst).unwrap();
        println!("cargo:rustc-env=MIPVIEW_SHADER_DIR={}", dst.display());

        let comp = shaderc::Compiler::new().unwrap();
        let mut opts = shaderc::CompileOptions::new().unwrap();
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        for (name, kind) in [
            ("quad.vert", shaderc::ShaderKind::Vertex),
            ("quad.frag", shaderc::ShaderKind::Fragment),
        ] {
            let src_path = Path::new("shaders").join(name);
            let src = fs::read_to_string(&src_path).unwrap();
            let spv = comp
                .compile_into_spirv(&src, kind, name, "main", Some(&opts))
                .unwrap_or_else(|e| panic!("{}: {e}", src_path.display()));
            fs::write(dst.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
        }
    }
}
