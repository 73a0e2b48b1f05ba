use crate::error::Result;
use crate::expand::DomExpander;
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the expand_sections tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExpandSectionsParams {
    /// Override the configured number of expansion passes
    #[serde(default)]
    pub max_passes: Option<usize>,
}

/// Opens every collapsed section on the page without collecting anything
#[derive(Default)]
pub struct ExpandSectionsTool;

impl Tool for ExpandSectionsTool {
    type Params = ExpandSectionsParams;

    fn name(&self) -> &str {
        "expand_sections"
    }

    fn execute_typed(&self, params: ExpandSectionsParams, context: &mut ToolContext) -> Result<ToolResult> {
        let _run = context.session.begin_run()?;

        let page = context.page()?;
        let expander = DomExpander::new(&page, context.config());
        let report = match params.max_passes {
            Some(passes) => expander.expand_with_passes(passes)?,
            None => expander.expand_all()?,
        };
        ToolResult::success_from(&report)
    }
}
