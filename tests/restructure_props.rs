mod common;

use proptest::prelude::*;

use common::{body, content, link, odt, read_entry};
use odf_template::dom::NodeData;
use odf_template::{Context, Template};

/// Paragraph-level template structure.
#[derive(Debug, Clone)]
enum Block {
    Word(String),
    If(Vec<Block>),
    For(Vec<Block>),
}

fn block() -> impl Strategy<Value = Block> {
    let leaf = "[a-z]{1,8}".prop_map(Block::Word);
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Block::If),
            prop::collection::vec(inner, 0..4).prop_map(Block::For),
        ]
    })
}

fn write(block: &Block, out: &mut String) {
    let paragraph = |text: &str| format!("<text:p>{text}</text:p>");
    match block {
        Block::Word(word) => out.push_str(&paragraph(word)),
        Block::If(children) | Block::For(children) => {
            let (open, close) = match block {
                Block::If(_) => (r#"if test="flag""#, "/if"),
                _ => (r#"for each="i in one""#, "/for"),
            };
            out.push_str(&paragraph(&link(open)));
            for child in children {
                write(child, out);
            }
            out.push_str(&paragraph(&link(close)));
        }
    }
}

fn pairs(block: &Block) -> usize {
    match block {
        Block::Word(_) => 0,
        Block::If(children) | Block::For(children) => 1 + children.iter().map(pairs).sum::<usize>(),
    }
}

fn words(block: &Block, out: &mut Vec<String>) {
    match block {
        Block::Word(word) => out.push(word.clone()),
        Block::If(children) | Block::For(children) => {
            for child in children {
                words(child, out);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn restructured_pairs_become_directives(blocks in prop::collection::vec(block(), 1..5)) {
        let mut xml = String::new();
        for block in &blocks {
            write(block, &mut xml);
        }
        let template = Template::from_bytes(odt(&content(&xml))).unwrap();
        prop_assert!(template.warnings().is_empty());

        let doc = &template.parts()[0].document;
        let directives = doc
            .descendants(doc.root())
            .filter(|&id| matches!(doc.get(id).map(|n| &n.data), Some(NodeData::Directive(_))))
            .count();
        prop_assert_eq!(directives, blocks.iter().map(pairs).sum::<usize>());

        let links = doc
            .descendants(doc.root())
            .filter(|&id| doc.element(id).is_some_and(|el| el.name.local == "a"))
            .count();
        prop_assert_eq!(links, 0);

        let mut expected = Vec::new();
        for block in &blocks {
            words(block, &mut expected);
        }
        let ctx = Context::new()
            .with("flag", true)
            .unwrap()
            .with("one", vec![1])
            .unwrap();
        let out = template.render(ctx).unwrap();
        let rendered = read_entry(&out, "content.xml").unwrap();
        let expected: String = expected.iter().map(|w| format!("<text:p>{w}</text:p>")).collect();
        prop_assert_eq!(body(&rendered), expected.as_str());
    }
}
