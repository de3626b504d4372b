// NC program loader - reads a job file from disk into a tool path
use crate::domain::nc_program::parse_nc_program;
use crate::domain::toolpath::ToolPath;
use anyhow::Context;
use std::path::Path;

pub async fn load_nc_program(path: &Path) -> anyhow::Result<ToolPath> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading NC program {}", path.display()))?;
    // Controllers write Latin-1 comments; a lossy decode keeps the coordinates intact
    let source = String::from_utf8_lossy(&bytes);
    let path_points = parse_nc_program(&source);
    tracing::info!(file = %path.display(), points = path_points.len(), "NC program loaded");
    Ok(ToolPath::new(path_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loads_program_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.nc");
        fs::write(&path, "G0 X0 Y0\nG1 X0 Y0\nG1 X30 Y40 (first wall)\nM30\n").unwrap();

        let tool_path = load_nc_program(&path).await.unwrap();
        assert_eq!(tool_path.len(), 2);
        assert_eq!(tool_path.total_distance(), 50.0);
    }

    #[tokio::test]
    async fn test_missing_file_names_the_path() {
        let err = load_nc_program(Path::new("/nonexistent/job.nc")).await.unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/job.nc"));
    }
}
