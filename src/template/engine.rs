use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::TemplateError;
use super::node::Node;
use super::{parser, render};

/// A parsed template.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

/// Renders templates from strings and files.
///
/// Parsed files are cached by canonical path for the lifetime of the engine.
/// Each file is parsed at most once unless a render asks for a reload.
///
#[derive(Debug)]
pub struct TemplateEngine {
    cache: DashMap<PathBuf, Arc<Template>>,
    auto_escape: bool,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: parser::parse(source)?,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn render(&self, context: &Value, auto_escape: bool) -> String {
        render::render(&self.nodes, context, auto_escape)
    }
}

impl TemplateEngine {
    pub fn new(auto_escape: bool) -> Self {
        Self {
            cache: DashMap::new(),
            auto_escape,
        }
    }

    /// Parses and renders `source` without caching.
    ///
    pub fn render_str<C>(&self, source: &str, context: &C) -> Result<String, TemplateError>
    where
        C: Serialize + ?Sized,
    {
        let context = to_context(context)?;
        Ok(Template::parse(source)?.render(&context, self.auto_escape))
    }

    /// Renders the template file at `path`.
    ///
    /// When `auto_reload` is true the file is read and parsed again instead
    /// of being served from the cache.
    ///
    pub fn render_file<C>(
        &self,
        path: impl AsRef<Path>,
        auto_reload: bool,
        context: &C,
    ) -> Result<String, TemplateError>
    where
        C: Serialize + ?Sized,
    {
        let context = to_context(context)?;
        let template = self.load(path.as_ref(), auto_reload)?;

        Ok(template.render(&context, self.auto_escape))
    }

    /// Returns the parsed template at `path`, parsing it if it is not cached.
    ///
    pub fn load(&self, path: &Path, auto_reload: bool) -> Result<Arc<Template>, TemplateError> {
        let path = fs::canonicalize(path).map_err(|source| TemplateError::Io {
            path: path.to_owned(),
            source,
        })?;

        if auto_reload {
            return read_and_parse(&path).map(Arc::new);
        }

        if let Some(template) = self.cache.get(&path) {
            return Ok(Arc::clone(&template));
        }

        // The entry lock is held while the file is parsed so concurrent
        // first renders of the same path parse it once.
        let entry = self.cache.entry(path.clone()).or_try_insert_with(|| {
            tracing::debug!(path = %path.display(), "parsing template");
            read_and_parse(&path).map(Arc::new)
        })?;

        Ok(Arc::clone(&entry))
    }

    /// Returns the number of cached templates.
    ///
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

fn to_context<C>(context: &C) -> Result<Value, TemplateError>
where
    C: Serialize + ?Sized,
{
    serde_json::to_value(context).map_err(TemplateError::Context)
}

fn read_and_parse(path: &Path) -> Result<Template, TemplateError> {
    let source = fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_owned(),
        source,
    })?;

    Template::parse(&source)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use std::thread;

    use super::TemplateEngine;
    use crate::template::TemplateError;

    #[test]
    fn render_str_escapes_by_default() {
        let engine = TemplateEngine::default();
        let html = engine.render_str("{{ x }}", &json!({ "x": "<b>" })).unwrap();

        assert_eq!(html, "&lt;b&gt;");
        assert_eq!(
            TemplateEngine::new(false)
                .render_str("{{ x }}", &json!({ "x": "<b>" }))
                .unwrap(),
            "<b>"
        );
    }

    #[test]
    fn files_are_cached_until_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        let engine = TemplateEngine::default();

        fs::write(&path, "v1 {{ n }}").unwrap();
        assert_eq!(engine.render_file(&path, false, &json!({ "n": 1 })).unwrap(), "v1 1");

        fs::write(&path, "v2 {{ n }}").unwrap();
        assert_eq!(engine.render_file(&path, false, &json!({ "n": 2 })).unwrap(), "v1 2");
        assert_eq!(engine.render_file(&path, true, &json!({ "n": 3 })).unwrap(), "v2 3");
        assert_eq!(engine.cached(), 1);
    }

    #[test]
    fn cached_and_uncached_output_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.html");
        let source = "{% for n in items %}{{ n }},{% endfor %}";
        let context = json!({ "items": [1, 2, 3] });
        let engine = TemplateEngine::default();

        fs::write(&path, source).unwrap();

        let uncached = engine.render_str(source, &context).unwrap();
        let first = engine.render_file(&path, false, &context).unwrap();
        let second = engine.render_file(&path, false, &context).unwrap();

        assert_eq!(uncached, "1,2,3,");
        assert_eq!(first, uncached);
        assert_eq!(second, uncached);
    }

    #[test]
    fn concurrent_first_loads_share_one_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.html");
        let engine = Arc::new(TemplateEngine::default());

        fs::write(&path, "{{ a }}").unwrap();

        let loaded: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let path = path.clone();

                thread::spawn(move || engine.load(&path, false).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        for template in &loaded {
            assert!(Arc::ptr_eq(template, &loaded[0]));
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let engine = TemplateEngine::default();
        let error = engine
            .render_file("/definitely/not/here.html", false, &json!({}))
            .unwrap_err();

        assert!(matches!(error, TemplateError::Io { .. }));
    }

    #[test]
    fn syntax_errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.html");
        let engine = TemplateEngine::default();

        fs::write(&path, "{% if x %}").unwrap();
        assert!(matches!(
            engine.render_file(&path, false, &json!({})),
            Err(TemplateError::Syntax { line: 1, .. })
        ));
        assert_eq!(engine.cached(), 0);
    }
}
