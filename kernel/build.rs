use std::{env, path::PathBuf};

fn main() {
    let target = env::var("TARGET").expect("TARGET not set");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let kernel_dir = PathBuf::from(manifest_dir);

    // Bare-metal AArch64 builds link with the kernel's own layout script.
    // Host builds (unit tests) use the default linker setup.
    if target.contains("aarch64") && target.contains("none") {
        let linker_script = kernel_dir.join("src/arch/aarch64/link.ld");
        println!("cargo:rustc-link-arg=-T{}", linker_script.display());
    }

    println!("cargo:rerun-if-changed=src/arch/aarch64/link.ld");
    println!("cargo:rerun-if-changed=src/arch/aarch64/boot.S");
}
