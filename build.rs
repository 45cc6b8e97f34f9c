//! Build script for the libxslt error trampoline.

fn main() {
    // libxslt reports through variadic callbacks, which need a C frame to format
    println!("cargo:rerun-if-changed=csrc/xslt_errors.c");

    cc::Build::new()
        .file("csrc/xslt_errors.c")
        .warnings(true)
        .compile("xslt_errors");
}
