use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rustc-check-cfg=cfg(rmos_cortex_m)");
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    let target = env::var("TARGET").unwrap();
    match target.as_str() {
        "thumbv7m-none-eabi" | "thumbv7em-none-eabi" => {
            // Real port: SVC / PendSV / SysTick context switching.
            println!("cargo:rustc-cfg=rmos_cortex_m");
        }
        "thumbv7em-none-eabihf" => {
            // The context switch saves the basic frame only.
            panic!("unsupported target {}, FPU context is not preserved; use thumbv7em-none-eabi", target);
        }
        t if t.starts_with("thumb") => {
            panic!("unsupported target {}, the Cortex-M port needs Armv7-M", t);
        }
        _ => {
            // Host builds run against the simulation port.
        }
    }

    if target.starts_with("thumb") {
        // Copy memory.x into OUT_DIR so the linker can find it
        let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
        fs::copy("memory.x", out_dir.join("memory.x")).unwrap();
        println!("cargo:rustc-link-search={}", out_dir.display());
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
    }
}
