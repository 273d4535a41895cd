//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization. The paths
//! mirror the conventional project layout:
//!
//! ```text
//! src/
//! ├── pages/*.twig          one output document per file
//! ├── templates/**/*.twig   layouts and partials
//! ├── data/global.json      shared template data
//! ├── js/main.js            shared entry script
//! ├── js/pages/<page>.js    optional per-page script
//! ├── scss/                 stylesheet load path
//! └── assets/{images,fonts}
//! public/                   copied verbatim
//! dist/                     build output
//! ```

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn src() -> PathBuf {
        "src".into()
    }

    pub fn pages() -> PathBuf {
        "src/pages".into()
    }

    pub fn templates() -> PathBuf {
        "src/templates".into()
    }

    pub fn data() -> PathBuf {
        "src/data/global.json".into()
    }

    pub fn scripts() -> PathBuf {
        "src/js".into()
    }

    pub fn entry() -> PathBuf {
        "src/js/main.js".into()
    }

    pub fn page_scripts() -> PathBuf {
        "src/js/pages".into()
    }

    pub fn styles() -> PathBuf {
        "src/scss".into()
    }

    pub fn images() -> PathBuf {
        "src/assets/images".into()
    }

    pub fn fonts() -> PathBuf {
        "src/assets/fonts".into()
    }

    pub fn public() -> PathBuf {
        "public".into()
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn node_modules() -> PathBuf {
        "node_modules".into()
    }

    pub fn public_path() -> String {
        "/".into()
    }

    pub fn entry_chunk() -> String {
        "main".into()
    }

    pub fn vendor_chunk() -> String {
        "vendors".into()
    }

    pub mod sass {
        use std::path::PathBuf;

        pub fn command() -> Vec<String> {
            vec!["sass".into(), "--stdin".into(), "--no-source-map".into()]
        }

        pub fn load_paths() -> Vec<PathBuf> {
            vec!["src/scss".into()]
        }
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        3000
    }

    pub fn reload_port() -> u16 {
        35729
    }
}
