//! Virtual file tree shared by the store, the channel payloads and the sandbox.
//!
//! On the wire a tree is a JSON object keyed by path whose values are either
//! `{ "file": { "contents": "..." } }` or `{ "directory": { ... } }`. Directory
//! nodes are flattened into `dir/child` paths while decoding; encoding always
//! produces the flat file form.

use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Contents of one file in the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNode {
    pub contents: String,
}

impl FileNode {
    #[must_use]
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

/// Path-keyed file mapping.
///
/// Iteration follows insertion order. Overwriting an existing path keeps its
/// original position; removing a path shifts later paths up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    nodes: IndexMap<String, FileNode>,
}

impl FileTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Inserts or replaces the node at `path`, returning the previous node.
    pub fn insert(&mut self, path: impl Into<String>, node: FileNode) -> Option<FileNode> {
        self.nodes.insert(path.into(), node)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileNode> {
        self.nodes.shift_remove(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileNode)> + '_ {
        self.nodes.iter().map(|(path, node)| (path.as_str(), node))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromIterator<(String, FileNode)> for FileTree {
    fn from_iter<I: IntoIterator<Item = (String, FileNode)>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FileTree {
    type Item = (String, FileNode);
    type IntoIter = indexmap::map::IntoIter<String, FileNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

#[derive(Serialize, Deserialize)]
struct WireFile {
    contents: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireNode {
    File { file: WireFile },
    Directory { directory: IndexMap<String, WireNode> },
}

#[derive(Serialize)]
struct WireFileRef<'a> {
    file: WireFileContentsRef<'a>,
}

#[derive(Serialize)]
struct WireFileContentsRef<'a> {
    contents: &'a str,
}

impl Serialize for FileTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (path, node) in &self.nodes {
            map.serialize_entry(
                path,
                &WireFileRef {
                    file: WireFileContentsRef {
                        contents: &node.contents,
                    },
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FileTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = IndexMap::<String, WireNode>::deserialize(deserializer)?;
        let mut tree = FileTree::new();
        flatten_into(&mut tree, "", wire);
        Ok(tree)
    }
}

fn flatten_into(tree: &mut FileTree, prefix: &str, nodes: IndexMap<String, WireNode>) {
    for (name, node) in nodes {
        let name = name.trim_matches('/');
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };

        match node {
            WireNode::File { file } => {
                tree.insert(path, FileNode::new(file.contents));
            }
            WireNode::Directory { directory } => flatten_into(tree, &path, directory),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{FileNode, FileTree};

    #[test]
    fn decodes_flat_file_nodes_in_document_order() {
        let tree: FileTree = serde_json::from_value(json!({
            "package.json": { "file": { "contents": "{}" } },
            "app.js": { "file": { "contents": "x=1" } },
        }))
        .expect("flat tree should decode");

        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["package.json", "app.js"]);
        assert_eq!(tree.get("app.js"), Some(&FileNode::new("x=1")));
    }

    #[test]
    fn flattens_directory_nodes_into_joined_paths() {
        let tree: FileTree = serde_json::from_value(json!({
            "src": {
                "directory": {
                    "index.js": { "file": { "contents": "main()" } },
                    "lib/": {
                        "directory": {
                            "util.js": { "file": { "contents": "util" } }
                        }
                    }
                }
            }
        }))
        .expect("nested tree should decode");

        assert_eq!(
            tree.paths().collect::<Vec<_>>(),
            vec!["src/index.js", "src/lib/util.js"]
        );
    }

    #[test]
    fn encodes_as_flat_file_objects() {
        let mut tree = FileTree::new();
        tree.insert("a.js", FileNode::new("x=1"));

        assert_eq!(
            serde_json::to_value(&tree).expect("tree should encode"),
            json!({ "a.js": { "file": { "contents": "x=1" } } })
        );
    }

    #[test]
    fn rejects_nodes_that_are_neither_file_nor_directory() {
        let decoded = serde_json::from_value::<FileTree>(json!({ "a.js": { "link": "b.js" } }));
        assert!(decoded.is_err());
    }

    #[test]
    fn overwrite_keeps_position_and_remove_shifts() {
        let mut tree = FileTree::new();
        tree.insert("a", FileNode::new("1"));
        tree.insert("b", FileNode::new("2"));
        tree.insert("c", FileNode::new("3"));

        let previous = tree.insert("a", FileNode::new("updated"));
        assert_eq!(previous, Some(FileNode::new("1")));
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        tree.remove("b");
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
