//! The boundary between asset import and the renderer.
//!
//! File formats are not parsed here. An importer is anything that can
//! produce a [`SceneGraph`]; the renderer validates what it receives.

use crate::error::ResourceResult;
use crate::model::SceneGraph;
use crate::procedural;

/// Produces a scene graph.
pub trait SceneImporter {
    fn import(&mut self) -> ResourceResult<SceneGraph>;
}

impl<F> SceneImporter for F
where
    F: FnMut() -> ResourceResult<SceneGraph>,
{
    fn import(&mut self) -> ResourceResult<SceneGraph> {
        self()
    }
}

/// Importer for the built-in textured cube scene.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProceduralImporter;

impl SceneImporter for ProceduralImporter {
    fn import(&mut self) -> ResourceResult<SceneGraph> {
        Ok(procedural::textured_cube())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;

    #[test]
    fn test_closure_importer() {
        let mut importer = || Ok(SceneGraph::default());
        assert!(importer.import().unwrap().models.is_empty());

        let mut failing = || Err(ResourceError::Import("unsupported".into()));
        assert!(matches!(failing.import(), Err(ResourceError::Import(_))));
    }

    #[test]
    fn test_procedural_importer_is_valid() {
        let scene = ProceduralImporter.import().unwrap();
        assert!(scene.validate().is_ok());
    }
}
