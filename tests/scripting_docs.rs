//! Test that all Rhai code blocks in scripting.md compile and evaluate.
//!
//! Run with: cargo test --test scripting_docs

use std::fs;
use std::rc::Rc;

use scriptobj::host::RecordingHost;
use scriptobj::{BridgeConfig, Instance, Platform, SaveStatus, TypedValue};

/// Extract all Rhai code blocks from markdown content
fn extract_rhai_blocks(content: &str) -> Vec<(usize, String)> {
    let mut blocks = Vec::new();
    let mut in_rhai_block = false;
    let mut current_block = String::new();
    let mut block_start_line = 0;

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().starts_with("```rhai") {
            in_rhai_block = true;
            block_start_line = line_num + 1;
            current_block.clear();
        } else if in_rhai_block && line.trim() == "```" {
            in_rhai_block = false;
            blocks.push((block_start_line, current_block.clone()));
        } else if in_rhai_block {
            current_block.push_str(line);
            current_block.push('\n');
        }
    }

    blocks
}

#[test]
fn test_all_rhai_blocks_evaluate() {
    let scripting_md_path = concat!(env!("CARGO_MANIFEST_DIR"), "/scripting.md");
    let content = fs::read_to_string(scripting_md_path).expect("Failed to read scripting.md");

    let blocks = extract_rhai_blocks(&content);
    assert!(!blocks.is_empty(), "No Rhai code blocks found in scripting.md");

    let platform = Platform::init(BridgeConfig::default());
    let mut errors = Vec::new();

    for (line_num, block) in &blocks {
        // Fresh instance per block, with a typical argument list.
        let host = Rc::new(RecordingHost::new());
        let mut instance = Instance::create(
            &platform,
            host.clone(),
            vec![TypedValue::Int(1), TypedValue::Float(2.5), TypedValue::from("foo")],
        )
        .expect("instance");

        let status = instance.editor_saved(block);
        let diagnostics = instance.take_diagnostics();
        if status != SaveStatus::Compiled || !diagnostics.is_empty() {
            let messages: Vec<String> = diagnostics.iter().map(|d| d.message.clone()).collect();
            errors.push(format!(
                "Block starting at line {} failed:\n{}\nError: {}",
                line_num,
                block.lines().take(3).collect::<Vec<_>>().join("\n"),
                messages.join("; ")
            ));
        }
    }

    if !errors.is_empty() {
        panic!(
            "Found {} error(s) in scripting.md:\n\n{}",
            errors.len(),
            errors.join("\n\n---\n\n")
        );
    }

    println!("Successfully evaluated {} Rhai code blocks", blocks.len());
}

#[test]
fn test_handler_examples_behave_as_documented() {
    let content = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/scripting.md"))
        .expect("Failed to read scripting.md");
    let blocks = extract_rhai_blocks(&content);
    let output_block = blocks
        .iter()
        .map(|(_, block)| block)
        .find(|block| block.contains("emit(99, 1, 2)"))
        .expect("output example");

    let platform = Platform::init(BridgeConfig::default());
    let host = Rc::new(RecordingHost::new());
    let mut instance = Instance::create(&platform, host.clone(), vec![]).unwrap();
    assert_eq!(instance.editor_saved(output_block), SaveStatus::Compiled);
    instance.bang(0);

    assert_eq!(
        host.messages(),
        vec![
            (0, vec![TypedValue::Int(1), TypedValue::Int(2)]),
            (0, vec![TypedValue::from("pair"), TypedValue::Float(0.5)]),
            (0, vec![TypedValue::Int(1), TypedValue::Int(2)]),
        ]
    );
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].starts_with("no such outlet:"));
}
