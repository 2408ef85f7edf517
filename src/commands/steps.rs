//! Module inspection commands.
//!
//! `steps` prints the flattened step plan of a module definition; `check`
//! validates a definition and its asset references without starting an
//! attempt.

use crate::module::{AssetResolver, Bundle, Module};
use crate::player::StepTable;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Prints the step plan for the module at `file`.
pub fn handle_steps(file: PathBuf) -> Result<()> {
    let module = Arc::new(Module::from_path(&file)?);
    let table = StepTable::new(Arc::clone(&module));

    println!(
        "Module {} ({}): {} steps, {} questions",
        module.id,
        module.section,
        table.total_steps(),
        table.total_questions()
    );
    println!();

    for position in 0..table.total_steps() {
        let Some((bundle, offset)) = table.bundle_at(position) else {
            continue;
        };
        let range = table.question_range(position);
        let detail = match bundle {
            Bundle::Simple(_) => table
                .sub_question_at(position)
                .map(|q| format!("question {q}"))
                .unwrap_or_default(),
            Bundle::FillIn(b) => format!("{} blanks", b.blanks.len()),
            Bundle::TimedWriting(b) => format!("question {}", b.question_id),
            Bundle::SentenceBuild(b) => format!("question {}", b.question_id),
            Bundle::SpeakingSequence(b) => {
                if offset == 0 {
                    format!("parent, {} children follow", b.children.len())
                } else {
                    format!("child {} ({}s window)", offset - 1, b.record_secs())
                }
            }
        };
        println!(
            "  {:>3}  {:<17} {:<12} {}",
            position + 1,
            bundle.variant_name(),
            format!("[{range}]"),
            detail
        );
    }
    Ok(())
}

/// Validates the module at `file` and reports unresolvable asset references.
pub fn handle_check(file: PathBuf) -> Result<()> {
    let module = Module::from_path(&file)?;
    let resolver = AssetResolver::new(&module.assets);

    let mut missing = Vec::new();
    for reference in module.referenced_assets() {
        if resolver.resolve(reference).is_none() {
            missing.push(reference.to_string());
        }
    }

    println!("Module {} is structurally valid.", module.id);
    if missing.is_empty() {
        println!("All asset references resolve.");
    } else {
        // Missing assets degrade to no media at run time, so this is a
        // warning, not a failure.
        println!("{} asset reference(s) do not resolve:", missing.len());
        for id in &missing {
            println!("  {id}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::test_fixtures::{module_of, simple, speaking};
    use std::io::Write;

    fn write_module(module: &Module) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(module).unwrap().as_bytes())
            .unwrap();
        file
    }

    #[test]
    fn steps_accepts_a_valid_definition() {
        let module = module_of(vec![simple("b1", 2), speaking("b2", 1)]);
        let file = write_module(&module);
        handle_steps(file.path().to_path_buf()).unwrap();
    }

    #[test]
    fn check_flags_unresolved_references_without_failing() {
        let module = module_of(vec![speaking("b1", 1)]);
        let file = write_module(&module);
        handle_check(file.path().to_path_buf()).unwrap();
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        assert!(handle_check(file.path().to_path_buf()).is_err());
    }
}
