use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use futures::future::BoxFuture;
use glam::DVec2;
use std::path::PathBuf;
use tile_core::Aabb2;

const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("region aabb", DataType::Aabb2)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRegionAabbSettings {
    pub file_path: PathBuf,
}

/// Reads a world-space region from a text file holding `min_x`, `min_y`,
/// `max_x` and `max_y`, one number per line.
pub struct LoadRegionAabbNode {
    settings: LoadRegionAabbSettings,
    region: Option<Aabb2>,
}

/// Parses the four-line extent format. Trailing lines are ignored.
pub fn parse_region_aabb(text: &str) -> Result<Aabb2> {
    let mut lines = text.lines();
    let mut values = [0.0f64; 4];
    for value in &mut values {
        let line = lines.next().unwrap_or_default().trim();
        *value = line
            .parse()
            .map_err(|_| ComputeError::InvalidInput(format!("could not read {line:?} as a number")))?;
    }
    let [min_x, min_y, max_x, max_y] = values;
    if min_x >= max_x {
        return Err(ComputeError::InvalidInput(format!("min x {min_x} is not below max x {max_x}")));
    }
    if min_y >= max_y {
        return Err(ComputeError::InvalidInput(format!("min y {min_y} is not below max y {max_y}")));
    }
    Ok(Aabb2::new(DVec2::new(min_x, min_y), DVec2::new(max_x, max_y)))
}

impl LoadRegionAabbNode {
    pub fn new(settings: LoadRegionAabbSettings) -> Self {
        Self { settings, region: None }
    }

    async fn run_impl(&mut self) -> Result<()> {
        let path = &self.settings.file_path;
        let text = tokio::fs::read_to_string(path).await?;
        let region = parse_region_aabb(&text)
            .map_err(|e| ComputeError::InvalidInput(format!("region file {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), ?region, "region loaded");
        self.region = Some(region);
        Ok(())
    }
}

impl Node for LoadRegionAabbNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        &[]
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        match index {
            0 => self.region.map(Data::Aabb2),
            _ => None,
        }
    }

    fn run(&mut self, _inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_lines_make_a_box() {
        let region = parse_region_aabb("1263000.5\n5860000\n1265000.25\n5862000\n").unwrap();
        assert_eq!(region, Aabb2::new(DVec2::new(1263000.5, 5860000.0), DVec2::new(1265000.25, 5862000.0)));
    }

    #[test]
    fn inverted_and_short_files_are_rejected() {
        assert!(matches!(parse_region_aabb("10\n0\n5\n1"), Err(ComputeError::InvalidInput(_))));
        assert!(matches!(parse_region_aabb("0\n10\n5\n10"), Err(ComputeError::InvalidInput(_))));
        assert!(matches!(parse_region_aabb("0\n0\n5"), Err(ComputeError::InvalidInput(_))));
        assert!(matches!(parse_region_aabb("0\nwest\n5\n5"), Err(ComputeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn region_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("region.txt");
        std::fs::write(&file_path, "0\n0\n100\n50\n").unwrap();

        let mut node = LoadRegionAabbNode::new(LoadRegionAabbSettings { file_path });
        node.run(Inputs::new(&[], Vec::new())).await.unwrap();
        let Some(Data::Aabb2(region)) = node.output(0) else { panic!("no region") };
        assert_eq!(region.size(), DVec2::new(100.0, 50.0));
    }
}
