//! File-backed stand-in for the remote client.
//!
//! Results are registered per template as paths to pre-captured XML files.
//! Nothing is checked at registration; the file is read and parsed on every
//! fetch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::client::{QueryClient, TemplateId};
use crate::error::QueryError;
use crate::xml::{self, Element};

/// Serves template results from the local file system.
#[derive(Debug, Clone, Default)]
pub struct StubQueryClient {
    results: HashMap<TemplateId, PathBuf>,
}

impl StubQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `template` with the result file at `path`.
    ///
    /// Replaces any earlier registration and returns its path.
    pub fn register_template_result(
        &mut self,
        template: TemplateId,
        path: impl Into<PathBuf>,
    ) -> Option<PathBuf> {
        self.results.insert(template, path.into())
    }

    pub fn is_registered(&self, template: TemplateId) -> bool {
        self.results.contains_key(&template)
    }

    pub fn registered_path(&self, template: TemplateId) -> Option<&Path> {
        self.results.get(&template).map(PathBuf::as_path)
    }
}

impl QueryClient for StubQueryClient {
    fn fetch_template_result(&self, template: TemplateId) -> Result<Element, QueryError> {
        let path = self
            .results
            .get(&template)
            .ok_or(QueryError::Lookup { template })?;
        trace!(template, path = %path.display(), "reading stub template result");
        Ok(xml::parse_file(path)?)
    }
}
