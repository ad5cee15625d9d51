//! OpenAPI document assembly.

use utoipa::OpenApi;

use super::handlers;

#[derive(OpenApi)]
#[openapi(info(
    title = "snapvault",
    description = "Encrypted backup and restore service",
))]
struct RootApiDoc;

/// Merge the per-module API docs into one document.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = RootApiDoc::openapi();
    doc.merge(handlers::backups::BackupApiDoc::openapi());
    doc.merge(handlers::restores::RestoreApiDoc::openapi());
    doc.merge(handlers::schedules::ScheduleApiDoc::openapi());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_includes_all_modules() {
        let doc = build_openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.contains("backups")));
        assert!(paths.iter().any(|p| p.contains("restores")));
        assert!(paths.iter().any(|p| p.contains("schedules")));
    }
}
