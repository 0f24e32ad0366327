//! Export handlers

use std::path::Path;

use annodb_core::{Engine, ExportOptions};

use crate::output::Output;

pub fn labels(engine: &Engine, path: &Path, output: &Output) -> bool {
    match engine.export_labels(path) {
        Ok(summary) => {
            output.print_export("export-labels", &summary);
            true
        }
        Err(e) => {
            output.print_failure("export-labels", path, &e);
            false
        }
    }
}

pub fn documents(engine: &Engine, path: &Path, options: &ExportOptions, output: &Output) -> bool {
    match engine.export_documents(path, options) {
        Ok(summary) => {
            output.print_export("export-docs", &summary);
            true
        }
        Err(e) => {
            output.print_failure("export-docs", path, &e);
            false
        }
    }
}
