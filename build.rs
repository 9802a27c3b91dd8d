fn main() {
    // The desktop shell needs the generated Tauri context; the library alone does not.
    #[cfg(feature = "desktop")]
    tauri_build::build()
}
