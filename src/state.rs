use std::sync::OnceLock;

use crate::errors::TemplateError;
use crate::template::SheetTemplate;

/// The sheet template in use by this process. Set once at startup, shared
/// read-only by every scan afterwards; changing it requires a restart.
static TEMPLATE: OnceLock<SheetTemplate> = OnceLock::new();

pub fn init_template(template: SheetTemplate) -> Result<&'static SheetTemplate, TemplateError> {
    template.validate()?;
    TEMPLATE
        .set(template)
        .map_err(|_| TemplateError::AlreadyLoaded)?;
    TEMPLATE.get().ok_or(TemplateError::AlreadyLoaded)
}
