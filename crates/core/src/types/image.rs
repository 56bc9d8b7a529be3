//! Image views and the asset path convention.

use serde::{Deserialize, Serialize};

/// Root under which house image snippets are served.
pub const IMAGE_ROOT: &str = "/houses/snippets";

/// Which rendering of a house to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageView {
    /// Front elevation.
    #[default]
    Facade,
    /// Isometric volume.
    Isometric,
    /// Floor plan.
    Layout,
}

impl ImageView {
    /// All views, in tab order.
    pub const ALL: [Self; 3] = [Self::Facade, Self::Isometric, Self::Layout];

    /// Suffix token used in asset file names.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Facade => "fachada",
            Self::Isometric => "volumetria",
            Self::Layout => "layout",
        }
    }

    /// Tab label shown to the user.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Facade => "Facade",
            Self::Isometric => "Isometric",
            Self::Layout => "Floor Plan",
        }
    }

    /// Query-string value (`facade`, `isometric`, `layout`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Facade => "facade",
            Self::Isometric => "isometric",
            Self::Layout => "layout",
        }
    }
}

/// Build the asset path for an image reference and view.
///
/// `XS_-_A.jpg` with [`ImageView::Facade`] becomes
/// `/houses/snippets/XS_A/XS_A_fachada.jpg`.
#[must_use]
pub fn image_path(image_ref: &str, view: ImageView) -> String {
    let base = image_ref.replacen(".jpg", "", 1).replace("_-_", "_");
    format!("{IMAGE_ROOT}/{base}/{base}_{}.jpg", view.token())
}
