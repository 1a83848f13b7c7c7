use crate::core::config::MirrorSelection;
use crate::core::constants::OSM_MIRRORS;
use crate::core::geo::TileCoord;
use crate::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

/// Substitutes `{z}`, `{x}`, `{y}` and `{-y}` into one of several mirror
/// templates.
#[derive(Debug)]
pub struct UrlTemplateSource {
    templates: Vec<String>,
    selection: MirrorSelection,
    next: AtomicUsize,
}

impl UrlTemplateSource {
    /// Every template needs `{z}`, `{x}` and one of `{y}` / `{-y}`.
    pub fn new<I, S>(templates: I, selection: MirrorSelection) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let templates: Vec<String> = templates.into_iter().map(Into::into).collect();
        if templates.is_empty() {
            return Err(Error::InvalidTemplate("no URL templates given".into()));
        }
        for template in &templates {
            let has_row = template.contains("{y}") || template.contains("{-y}");
            if !template.contains("{z}") || !template.contains("{x}") || !has_row {
                return Err(Error::InvalidTemplate(format!(
                    "{template} is missing a {{z}}, {{x}} or {{y}} placeholder"
                )));
            }
        }
        Ok(Self {
            templates,
            selection,
            next: AtomicUsize::new(0),
        })
    }

    pub fn single(template: impl Into<String>) -> Result<Self> {
        Self::new([template.into()], MirrorSelection::RoundRobin)
    }

    /// The public OpenStreetMap servers, `a`/`b`/`c` mirrors.
    pub fn openstreetmap(selection: MirrorSelection) -> Self {
        Self {
            templates: OSM_MIRRORS.iter().map(|t| t.to_string()).collect(),
            selection,
            next: AtomicUsize::new(0),
        }
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    fn pick(&self, coord: TileCoord) -> &str {
        let n = self.templates.len();
        let idx = match self.selection {
            MirrorSelection::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % n,
            MirrorSelection::ByCoordinate => ((coord.x as u64 + coord.y as u64) % n as u64) as usize,
        };
        &self.templates[idx]
    }

    /// Fills the placeholders of `template` for `coord`.
    pub fn expand(template: &str, coord: TileCoord) -> String {
        template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{-y}", &coord.tms_y().to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

impl TileSource for UrlTemplateSource {
    fn url(&self, coord: TileCoord) -> String {
        Self::expand(self.pick(coord), coord)
    }
}
