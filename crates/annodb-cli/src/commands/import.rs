//! Import handlers

use std::path::PathBuf;

use annodb_core::Engine;

use crate::output::Output;

/// Import label files, one transaction per file
pub fn labels(engine: &mut Engine, paths: &[PathBuf], output: &Output) -> bool {
    let batch = engine.import_labels(paths);
    output.print_batch("import-labels", &batch);
    batch.is_success()
}

/// Import document files, one transaction per file
pub fn documents(engine: &mut Engine, paths: &[PathBuf], output: &Output) -> bool {
    let batch = engine.import_documents(paths);
    output.print_batch("import-docs", &batch);
    batch.is_success()
}
