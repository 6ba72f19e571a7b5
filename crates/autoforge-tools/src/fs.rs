//! Sandboxed filesystem tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::error::ToolError;
use crate::models::{ToolDefinition, ToolFn};

/// Arguments for the `read_file` tool.
#[derive(Debug, Deserialize)]
pub struct ReadFileArgs {
    pub path: String,
    #[serde(default = "ReadFileArgs::default_max_bytes")]
    pub max_bytes: usize,
}

impl ReadFileArgs {
    fn default_max_bytes() -> usize {
        4000
    }
}

/// Joins `path` onto `root` and rejects any result that escapes the root.
///
/// The check runs on the lexically normalized path so it also covers
/// targets that do not exist yet.
pub fn safe_join(root: &Path, path: &str) -> Result<PathBuf, ToolError> {
    let mut joined = root.to_path_buf();
    for component in Path::new(path).components() {
        match component {
            std::path::Component::Normal(part) => joined.push(part),
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !joined.pop() || !joined.starts_with(root) {
                    return Err(ToolError::PathEscape(path.to_string()));
                }
            }
            std::path::Component::RootDir | std::path::Component::Prefix(_) => {
                return Err(ToolError::PathEscape(path.to_string()));
            }
        }
    }
    if joined.starts_with(root) {
        Ok(joined)
    } else {
        Err(ToolError::PathEscape(path.to_string()))
    }
}

/// Builds the `read_file` tool rooted at `root`.
///
/// Output: `{exists, content, truncated}`. A missing file is a successful
/// call with `exists = false`, not an error.
pub fn read_file_tool(root: PathBuf) -> ToolDefinition {
    let func: ToolFn = Arc::new(move |args| {
        let root = root.clone();
        Box::pin(async move {
            let args: ReadFileArgs = serde_json::from_value(args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
            let target = safe_join(&root, &args.path)?;

            if !target.is_file() {
                return Ok(json!({"exists": false, "content": "", "truncated": false}));
            }

            let content = tokio::fs::read_to_string(&target).await?;
            let truncated = content.len() > args.max_bytes;
            let mut clipped = content;
            if truncated {
                // Clip on a char boundary.
                let mut end = args.max_bytes;
                while end > 0 && !clipped.is_char_boundary(end) {
                    end -= 1;
                }
                clipped.truncate(end);
            }
            Ok(json!({"exists": true, "content": clipped, "truncated": truncated}))
        })
    });

    ToolDefinition::new("read_file", "Read a file from the workspace root", func)
        .with_tags(["filesystem"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{execute_tool, ToolRegistry};

    #[test]
    fn safe_join_accepts_nested_paths() {
        let root = Path::new("/workspace");
        assert_eq!(
            safe_join(root, "src/app.py").unwrap(),
            PathBuf::from("/workspace/src/app.py")
        );
        assert_eq!(
            safe_join(root, "./src/../src/app.py").unwrap(),
            PathBuf::from("/workspace/src/app.py")
        );
    }

    #[test]
    fn safe_join_rejects_escapes() {
        let root = Path::new("/workspace");
        assert!(safe_join(root, "../etc/passwd").is_err());
        assert!(safe_join(root, "src/../../etc/passwd").is_err());
        assert!(safe_join(root, "/etc/passwd").is_err());
    }

    #[tokio::test]
    async fn read_file_reads_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("hello.py"), "print('hello world')")
            .await
            .unwrap();

        let registry = ToolRegistry::new();
        registry.register(read_file_tool(dir.path().to_path_buf()));

        let result = execute_tool(
            &registry,
            "read_file",
            json!({"path": "hello.py", "max_bytes": 5}),
        )
        .await;
        assert!(result.success);
        let output = result.output.unwrap();
        assert_eq!(output["exists"], json!(true));
        assert_eq!(output["content"], json!("print"));
        assert_eq!(output["truncated"], json!(true));
    }

    #[tokio::test]
    async fn read_file_missing_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new();
        registry.register(read_file_tool(dir.path().to_path_buf()));

        let result = execute_tool(&registry, "read_file", json!({"path": "nope.py"})).await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["exists"], json!(false));
    }

    #[tokio::test]
    async fn read_file_escape_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new();
        registry.register(read_file_tool(dir.path().to_path_buf()));

        let result = execute_tool(&registry, "read_file", json!({"path": "../secrets"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("escapes"));
    }
}
