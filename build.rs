// Build script for native engine linking
//
// libmpv itself is linked through `#[link(name = "mpv")]` on the FFI block.
// This script only handles the pieces that depend on the target at build time.

fn main() {
    println!("cargo:rerun-if-changed=src/engine/backend/libmpv.rs");

    // Ensure Android builds link against libc++_shared so symbols pulled in by
    // libmpv's ffmpeg dependencies resolve correctly on all ABIs (arm/x86).
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }

    // Desktop builds with the libmpv feature may point at a custom prefix.
    if std::env::var("CARGO_FEATURE_LIBMPV").is_ok() {
        if let Ok(dir) = std::env::var("MPV_LIB_DIR") {
            println!("cargo:rustc-link-search=native={}", dir);
        }
        println!("cargo:rerun-if-env-changed=MPV_LIB_DIR");
    }
}
