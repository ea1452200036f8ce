use ro_core::types::*;

#[test]
fn file_node_serializes_type_field() {
    let node = FileNode::directory("src", "src")
        .with_children(vec![FileNode::file("main.rs", "src/main.rs")]);
    let json = serde_json::to_value(&node).unwrap();

    assert_eq!(json["type"], "directory");
    assert_eq!(json["children"][0]["type"], "file");
    assert!(json["children"][0].get("children").is_none());
    assert!(json.get("content").is_none());
}

#[test]
fn file_nodes_never_carry_children() {
    let node = FileNode::file("README.md", "README.md")
        .with_children(vec![FileNode::file("x", "x")]);
    assert!(node.children.is_none());
}

#[test]
fn walk_is_depth_first_in_listing_order() {
    let tree = FileNode::directory("root", "")
        .with_children(vec![
            FileNode::directory("a", "a").with_children(vec![FileNode::file("a1", "a/a1")]),
            FileNode::file("b", "b"),
        ]);
    let paths: Vec<&str> = tree.walk().iter().map(|n| n.path.as_str()).collect();
    assert_eq!(paths, vec!["", "a", "a/a1", "b"]);
}

#[test]
fn rate_limit_record_uses_camel_case() {
    let record = RateLimitRecord {
        count: 3,
        reset_at: 1_700_000_000,
    };
    let json = serde_json::to_string(&record).unwrap();
    assert_eq!(json, r#"{"count":3,"resetAt":1700000000}"#);
}

#[test]
fn prompt_context_stats() {
    let ctx = PromptContext::new("Directory structure:\n└── repo/\n    └── a.rs", "fn main() {}");
    assert_eq!(ctx.stats.files, 3);
    assert_eq!(ctx.stats.total_chars, 12);
}

#[test]
fn repo_context_converts_to_prompt_context() {
    let blob = RepoContext {
        tree: "t1\nt2".into(),
        content: "abc".into(),
        summary: None,
        collected_at: 0,
    };
    let ctx = blob.to_prompt_context();
    assert_eq!(ctx.stats, ContextStats { files: 2, total_chars: 3 });
}
