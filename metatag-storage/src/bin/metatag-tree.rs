/// Tag Tree Editor - applies tree operations to a saved tag tree
///
/// Usage: metatag-tree <data-dir> [op ...]
///
/// The tree lives in `<data-dir>/word-type.json`. Operations run left to right;
/// each may end with `@P` to address the children of root `P`.
use metatag_core::{CacheConfig, LogConfig, MetatagError, Node};
use metatag_storage::{init_tracing, CacheClient, FileStorage, TagTree};
use std::process;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Up(usize),
    Down(usize),
    Remove(usize),
    Add { id: String, name: String },
    Hide(usize),
    Show(usize),
}

fn usage() -> ! {
    eprintln!("Usage: metatag-tree <data-dir> [op ...]");
    eprintln!();
    eprintln!("Operations (append @P to address the children of root P):");
    eprintln!("  up I | down I | remove I | hide I | show I | add ID NAME");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  metatag-tree ./data down 0 add WTK04 adverb hide 1@0");
    process::exit(2);
}

fn parse_index(raw: &str) -> Result<(usize, Option<usize>), String> {
    let (index, parent) = match raw.split_once('@') {
        Some((index, parent)) => (index, Some(parent)),
        None => (raw, None),
    };
    let index = index
        .parse::<usize>()
        .map_err(|_| format!("not an index: {:?}", raw))?;
    let parent = parent
        .map(|p| p.parse::<usize>().map_err(|_| format!("not a parent index: {:?}", raw)))
        .transpose()?;
    Ok((index, parent))
}

fn parse_ops(args: &[String]) -> Result<Vec<(Op, Option<usize>)>, String> {
    let mut ops = Vec::new();
    let mut rest = args.iter();
    while let Some(word) = rest.next() {
        let mut next = |what: &str| {
            rest.next()
                .cloned()
                .ok_or_else(|| format!("{} expects {}", word, what))
        };
        let op = match word.as_str() {
            "up" | "down" | "remove" | "hide" | "show" => {
                let (index, parent) = parse_index(&next("an index")?)?;
                let op = match word.as_str() {
                    "up" => Op::Up(index),
                    "down" => Op::Down(index),
                    "remove" => Op::Remove(index),
                    "hide" => Op::Hide(index),
                    _ => Op::Show(index),
                };
                (op, parent)
            }
            "add" => {
                let id = next("an id")?;
                let raw_name = next("a name")?;
                let (name, parent) = match raw_name.rsplit_once('@') {
                    Some((name, p)) => match p.parse::<usize>() {
                        Ok(p) => (name.to_string(), Some(p)),
                        Err(_) => (raw_name.clone(), None),
                    },
                    None => (raw_name.clone(), None),
                };
                (Op::Add { id, name }, parent)
            }
            other => return Err(format!("unknown operation {:?}", other)),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn apply(tree: &TagTree, op: &Op, parent: Option<usize>) -> Result<bool, MetatagError> {
    Ok(match op {
        Op::Up(i) => tree.move_up(*i, parent),
        Op::Down(i) => tree.move_down(*i, parent),
        Op::Remove(i) => tree.remove_at(*i, parent),
        Op::Hide(i) => tree.hide(*i, parent),
        Op::Show(i) => tree.show(*i, parent),
        Op::Add { id, name } => tree.insert(Node::new(id.as_str()).with_name(name.as_str()), parent)?,
    })
}

fn print_tree(tree: &TagTree) {
    for (parent, node) in tree.flatten().iter() {
        let indent = if parent.is_some() { "    " } else { "" };
        let hidden = if node.hidden { " (hidden)" } else { "" };
        println!("{}{} {}{}", indent, node.id, node.fields.name, hidden);
    }
}

fn run(args: &[String]) -> Result<(), MetatagError> {
    let storage = FileStorage::new(&args[0]);
    let ops = parse_ops(&args[1..]).unwrap_or_else(|e| {
        eprintln!("{}", e);
        usage()
    });

    let client = CacheClient::new(CacheConfig::from_env()?)?;
    let tree = TagTree::new(&client)?;
    if !tree.hydrate(&storage)? {
        tracing::info!(path = %storage.path_for(metatag_storage::TAG_TREE_NAMESPACE).display(), "no saved tree, starting empty");
    }

    for (op, parent) in &ops {
        if !apply(&tree, op, *parent)? {
            eprintln!("skipped {:?} (address out of range)", op);
        }
    }

    print_tree(&tree);
    if !ops.is_empty() {
        tree.persist(&storage)?;
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }
    if let Err(e) = init_tracing(&LogConfig::from_env()) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
