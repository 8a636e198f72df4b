//! WASM bindings for the trebuchet designer.

mod scene;

pub use scene::WasmScene;
