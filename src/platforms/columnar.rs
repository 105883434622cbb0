//! Columnar warehouse adapter: `/columnar/<project>/<dataset>/<view>`.

use tracing::debug;

use crate::backend::warehouse::{WarehouseClient, WarehouseConnector};
use crate::core::ident;
use crate::core::{DriveError, NormalizedResult, Platform, RequestContext, Result};

const PLATFORM: Platform = Platform::Columnar;

fn invalid(reason: impl Into<String>) -> DriveError {
    DriveError::invalid_parameters(PLATFORM.token(), PLATFORM.path_shape(), reason)
}

/// A validated `project.dataset.view` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnarPlan {
    project: String,
    dataset: String,
    view: String,
}

impl ColumnarPlan {
    pub fn from_params(params: &[String]) -> Result<Self> {
        let [project, dataset, view] = params else {
            return Err(invalid(format!("expected 3 parameters, got {}", params.len())));
        };

        if !ident::is_project_id(project) {
            return Err(invalid(format!("{project:?} is not a valid project id")));
        }
        if !ident::is_dataset_id(dataset) {
            return Err(invalid(format!("{dataset:?} is not a valid dataset id")));
        }
        if !ident::is_table_id(view) {
            return Err(invalid(format!("{view:?} is not a valid view id")));
        }

        Ok(Self {
            project: project.clone(),
            dataset: dataset.clone(),
            view: view.clone(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn table_path(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.view)
    }

    /// Standard SQL reading the whole view.
    pub fn query(&self) -> String {
        format!("SELECT * FROM `{}`", self.table_path())
    }

    pub async fn open(
        self,
        connector: &dyn WarehouseConnector,
        ctx: &RequestContext,
    ) -> Result<ColumnarHandle> {
        let client = ctx.run(connector.connect(&self.project)).await?;
        Ok(ColumnarHandle {
            client: Some(client),
            query: self.query(),
        })
    }
}

pub struct ColumnarHandle {
    client: Option<Box<dyn WarehouseClient>>,
    query: String,
}

impl ColumnarHandle {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_released(&self) -> bool {
        self.client.is_none()
    }

    /// Run the query and drain every page into one array of records.
    pub async fn fetch(&mut self, ctx: &RequestContext) -> Result<NormalizedResult> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| DriveError::read_failure("warehouse client already released"))?;

        let mut page = ctx.run(client.query(&self.query)).await?;
        let mut rows = std::mem::take(&mut page.rows);
        let mut pages = 1usize;

        while let Some(cursor) = page.next.take() {
            page = ctx.run(client.next_page(&cursor)).await?;
            rows.append(&mut page.rows);
            pages += 1;
        }

        debug!(rows = rows.len(), pages, "warehouse query drained");
        Ok(NormalizedResult::Records(rows))
    }

    pub async fn release(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_fully_qualified_select() {
        let plan = ColumnarPlan::from_params(&params(&["projA", "dsB", "viewC"])).unwrap();
        assert_eq!(plan.table_path(), "projA.dsB.viewC");
        assert_eq!(plan.query(), "SELECT * FROM `projA.dsB.viewC`");
        assert_eq!(plan.project(), "projA");
    }

    #[test]
    fn requires_exactly_three_parameters() {
        for count in [0usize, 1, 2, 4, 5] {
            let given: Vec<String> = (0..count).map(|i| format!("p{i}")).collect();
            match ColumnarPlan::from_params(&given) {
                Err(DriveError::InvalidParameters { platform, shape, .. }) => {
                    assert_eq!(platform, "columnar");
                    assert_eq!(shape, "/columnar/<project>/<dataset>/<view>");
                }
                other => panic!("{count} params: expected invalid parameters, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_identifiers_that_would_escape_quoting() {
        let err = ColumnarPlan::from_params(&params(&["proj", "ds", "v` UNION SELECT 1 --"]));
        assert!(matches!(err, Err(DriveError::InvalidParameters { .. })));

        let err = ColumnarPlan::from_params(&params(&["proj", "d.s", "v"]));
        assert!(matches!(err, Err(DriveError::InvalidParameters { .. })));
    }
}
