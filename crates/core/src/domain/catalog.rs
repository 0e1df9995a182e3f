use serde::{Deserialize, Serialize};

use crate::domain::quote::ReferenceCode;
use crate::domain::session::Selections;

pub const HOMEPAGE_URL: &str = "https://www.printerpix.co.uk/";

/// Pseudo-selection ids used by the product picker.
pub const PRODUCT_PREFIX: &str = "product_";
pub const EXTRA_PREFIX: &str = "other_";
pub const SHOW_MORE_ID: &str = "product_other";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The spec steps a product may declare, in no particular order here; each
/// product lists its own ordered subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStep {
    Fabric,
    Size,
    Cover,
    Pages,
    MugType,
}

impl SpecStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fabric => "fabric",
            Self::Size => "size",
            Self::Cover => "cover",
            Self::Pages => "pages",
            Self::MugType => "mug_type",
        }
    }
}

/// Which WhatsApp interactive component renders a question. Buttons are
/// capped at three options by the platform; longer sets use a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecComponent {
    Buttons,
    List,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecOption {
    pub id: &'static str,
    pub title: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecQuestion {
    pub step: SpecStep,
    pub prompt: &'static str,
    pub component: SpecComponent,
    pub options: &'static [SpecOption],
}

impl SpecQuestion {
    pub fn accepts(&self, selection_id: &str) -> bool {
        self.options.iter().any(|option| option.id == selection_id)
    }
}

#[derive(Clone, Debug)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub questions: &'static [SpecQuestion],
}

/// Catalogue extras have no qualification questions and a single fixed
/// reference code; selecting one goes straight to quantity.
#[derive(Clone, Debug)]
pub struct CatalogueExtra {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub reference_code: &'static str,
}

const BLANKET_QUESTIONS: &[SpecQuestion] = &[
    SpecQuestion {
        step: SpecStep::Fabric,
        prompt: "Select fabric type:",
        component: SpecComponent::List,
        options: &[
            SpecOption { id: "fabric_fleece", title: "Fleece" },
            SpecOption { id: "fabric_mink_touch", title: "Mink Touch" },
            SpecOption { id: "fabric_sherpa", title: "Sherpa" },
            SpecOption { id: "fabric_double_sided", title: "Double Sided" },
        ],
    },
    SpecQuestion {
        step: SpecStep::Size,
        prompt: "Select size:",
        component: SpecComponent::List,
        options: &[
            SpecOption { id: "size_baby_20x25", title: "Baby (20x25 inches)" },
            SpecOption { id: "size_med_30x40", title: "Medium (30x40 inches)" },
            SpecOption { id: "size_throw_50x60", title: "Throw (50x60 inches)" },
            SpecOption { id: "size_queen_60x80", title: "Queen (60x80 inches)" },
        ],
    },
];

const CANVAS_QUESTIONS: &[SpecQuestion] = &[SpecQuestion {
    step: SpecStep::Size,
    prompt: "Select canvas size:",
    component: SpecComponent::List,
    options: &[
        SpecOption { id: "size_6x6", title: "6x6 inches" },
        SpecOption { id: "size_10x10", title: "10x10 inches" },
        SpecOption { id: "size_12x12", title: "12x12 inches" },
        SpecOption { id: "size_11x14", title: "11x14 inches" },
        SpecOption { id: "size_16x20", title: "16x20 inches" },
        SpecOption { id: "size_36x24", title: "36x24 inches" },
        SpecOption { id: "size_30x40", title: "30x40 inches" },
    ],
}];

const PHOTOBOOK_QUESTIONS: &[SpecQuestion] = &[
    SpecQuestion {
        step: SpecStep::Cover,
        prompt: "Select cover type:",
        component: SpecComponent::Buttons,
        options: &[
            SpecOption { id: "cover_hard_cover", title: "Hard Cover" },
            SpecOption { id: "cover_leather_cover", title: "Leather Cover" },
        ],
    },
    SpecQuestion {
        step: SpecStep::Size,
        prompt: "Select size:",
        component: SpecComponent::List,
        options: &[
            SpecOption { id: "size_8x6", title: "8x6 inches" },
            SpecOption { id: "size_8x8", title: "8x8 inches" },
            SpecOption { id: "size_11x8_5", title: "11x8.5 inches" },
            SpecOption { id: "size_11x11", title: "11x11 inches" },
        ],
    },
    SpecQuestion {
        step: SpecStep::Pages,
        prompt: "How many pages?",
        component: SpecComponent::Buttons,
        options: &[
            SpecOption { id: "pages_20", title: "20 pages" },
            SpecOption { id: "pages_40", title: "40 pages" },
            SpecOption { id: "pages_60", title: "60 pages" },
            SpecOption { id: "pages_custom", title: "Custom" },
        ],
    },
];

const MUG_QUESTIONS: &[SpecQuestion] = &[SpecQuestion {
    step: SpecStep::MugType,
    prompt: "Select mug type:",
    component: SpecComponent::Buttons,
    options: &[
        SpecOption { id: "type_classic_mug", title: "Classic Mug" },
        SpecOption { id: "type_magic_mug", title: "Magic Mug" },
        SpecOption { id: "type_latte_mug", title: "Latte Mug" },
        SpecOption { id: "type_magic_latte_mug", title: "Magic Latte Mug" },
    ],
}];

const PRODUCTS: &[Product] = &[
    Product {
        id: "blankets",
        name: "Blankets",
        url: "https://www.printerpix.co.uk/photo-blankets/mink-personalised-blanket/",
        questions: BLANKET_QUESTIONS,
    },
    Product {
        id: "canvas",
        name: "Canvas",
        url: "https://www.printerpix.co.uk/canvas-prints/v1/",
        questions: CANVAS_QUESTIONS,
    },
    Product {
        id: "photobooks",
        name: "Photo Books",
        url: "https://www.printerpix.co.uk/photo-books/hardcover-photobook/",
        questions: PHOTOBOOK_QUESTIONS,
    },
    Product {
        id: "mugs",
        name: "Mugs",
        url: "https://www.printerpix.co.uk/photo-mugs/magic-mugs/",
        questions: MUG_QUESTIONS,
    },
];

const EXTRAS: &[CatalogueExtra] = &[
    CatalogueExtra {
        id: "wall_calendar",
        name: "Wall Calendar",
        url: "https://www.printerpix.co.uk/photo-calendars/personalised-wall-calendar/",
        reference_code: "Cal_WallSS_12x17",
    },
    CatalogueExtra {
        id: "photo_frame",
        name: "Photo Frame",
        url: "https://www.printerpix.co.uk/photo-prints/photo-frame-prints/",
        reference_code: "Frame_Wooden_12x8_Oak_PackOf3",
    },
    CatalogueExtra {
        id: "jigsaw",
        name: "Jigsaw",
        url: "https://www.printerpix.co.uk/photo-gifts/all/personalised-jigsaw-puzzle-card/",
        reference_code: "BoxedPuzzle_Board_15x11",
    },
    CatalogueExtra {
        id: "photo_slate",
        name: "Photo Slate",
        url: "https://www.printerpix.co.uk/photo-gifts/all/photo-slate/",
        reference_code: "Slate_Rect_12x12",
    },
    CatalogueExtra {
        id: "mouse_mat",
        name: "Mouse Mat",
        url: "https://www.printerpix.co.uk/photo-gifts/all/personalised-mouse-mat/",
        reference_code: "MouseMat",
    },
    CatalogueExtra {
        id: "photo_cushion",
        name: "Photo Cushion",
        url: "https://www.printerpix.co.uk/photo-gifts/all/personalised-photo-cushion/",
        reference_code: "CushionPolyester_18x12",
    },
    CatalogueExtra {
        id: "metal_photo",
        name: "Metal Photo",
        url: "https://www.printerpix.co.uk/photo-prints/metal-photo-prints/",
        reference_code: "MetalPrint_12x12",
    },
];

#[derive(Clone, Debug, Default)]
pub struct Catalog;

impl Catalog {
    pub fn find(&self, product_id: &str) -> Option<&'static Product> {
        PRODUCTS.iter().find(|product| product.id == product_id)
    }

    pub fn extra(&self, extra_id: &str) -> Option<&'static CatalogueExtra> {
        EXTRAS.iter().find(|extra| extra.id == extra_id)
    }

    /// Rows for the initial product picker. "Other" leads to the extras
    /// sub-list without changing session state.
    pub fn product_rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![(SHOW_MORE_ID.to_string(), "Other".to_string())];
        rows.extend(PRODUCTS.iter().map(|product| {
            (format!("{PRODUCT_PREFIX}{}", product.id), product.name.to_string())
        }));
        rows
    }

    pub fn extra_rows(&self) -> Vec<(String, String)> {
        EXTRAS
            .iter()
            .map(|extra| (format!("{EXTRA_PREFIX}{}", extra.id), extra.name.to_string()))
            .collect()
    }

    pub fn display_name(&self, selections: &Selections) -> String {
        let Some(product) = selections.product.as_ref() else {
            return "your product".to_string();
        };
        if let Some(extra) = self.extra(product.as_str()) {
            return extra.name.to_string();
        }
        if let Some(product) = self.find(product.as_str()) {
            return product.name.to_string();
        }
        product.as_str().to_string()
    }

    pub fn product_url(&self, selections: &Selections) -> &'static str {
        let Some(product) = selections.product.as_ref() else {
            return HOMEPAGE_URL;
        };
        if let Some(extra) = self.extra(product.as_str()) {
            return extra.url;
        }
        if let Some(product) = self.find(product.as_str()) {
            return product.url;
        }
        HOMEPAGE_URL
    }

    /// First question whose step has no stored answer yet, in declared
    /// order. Steps already present are skipped, which is what makes a
    /// half-finished session resumable.
    pub fn next_question(
        &self,
        product: &'static Product,
        selections: &Selections,
    ) -> Option<&'static SpecQuestion> {
        product
            .questions
            .iter()
            .find(|question| selections.option_for(question.step).is_none())
    }

    pub fn all_steps_answered(&self, product: &'static Product, selections: &Selections) -> bool {
        self.next_question(product, selections).is_none()
    }

    /// Map completed selections to the canonical reference code.
    pub fn reference_code(&self, selections: &Selections) -> Option<ReferenceCode> {
        let product = selections.product.as_ref()?;
        if let Some(extra) = self.extra(product.as_str()) {
            return Some(ReferenceCode(extra.reference_code.to_string()));
        }

        let code = match product.as_str() {
            "blankets" => {
                let family = match selections.fabric.as_deref()? {
                    "fabric_fleece" => "BlanketFlannelfleece",
                    "fabric_mink_touch" => "BlanketPolarfleece",
                    "fabric_sherpa" => "BlanketSherpafleece",
                    "fabric_double_sided" => "DoubleSideBlanketFlannel",
                    _ => return None,
                };
                let dims = match selections.size.as_deref()? {
                    "size_baby_20x25" => "25x20",
                    "size_med_30x40" => "30x40",
                    "size_throw_50x60" => "50x60",
                    "size_queen_60x80" => "60x80",
                    _ => return None,
                };
                format!("{family}_{dims}")
            }
            "canvas" => match selections.size.as_deref()? {
                // Sizes without an exact entry in the price tables map to
                // the closest stocked canvas.
                "size_6x6" | "size_10x10" => "Canvas_F18_10x10".to_string(),
                "size_12x12" => "Canvas_F18_12x12".to_string(),
                "size_11x14" => "Canvas_F18_12x8".to_string(),
                "size_16x20" => "Canvas_F18_16x20".to_string(),
                "size_36x24" => "Canvas_F18_24x24".to_string(),
                "size_30x40" => "Canvas_F18_30x40".to_string(),
                _ => return None,
            },
            "photobooks" => match (selections.cover.as_deref()?, selections.size.as_deref()?) {
                ("cover_hard_cover", "size_8x6") => "PB_CailuxCover_8x6_Black_20pp".to_string(),
                ("cover_hard_cover", "size_8x8") => "PB_CailuxCover_8x8_Black_20pp".to_string(),
                ("cover_hard_cover", "size_11x8_5") => "PB_PhotoHardCover_12x8_50pp".to_string(),
                ("cover_hard_cover", "size_11x11") => "PB_CailuxCover_11x11_Black_20pp".to_string(),
                ("cover_leather_cover", "size_8x6") => "PB_LeatherCover_8x6_60pp".to_string(),
                ("cover_leather_cover", "size_8x8") => "PB_LeatherCover_8x8_100pp".to_string(),
                ("cover_leather_cover", "size_11x8_5") => "PB_LeatherCover_12x8_50pp".to_string(),
                ("cover_leather_cover", "size_11x11") => "PB_LeatherCover_11x11_100pp".to_string(),
                _ => return None,
            },
            "mugs" => match selections.mug_type.as_deref()? {
                "type_classic_mug" | "type_magic_mug" => "Mug_Basic_White_PackOf2".to_string(),
                "type_latte_mug" | "type_magic_latte_mug" => {
                    "Mug_Basic20oz_White_PackOf2".to_string()
                }
                _ => return None,
            },
            _ => return None,
        };

        Some(ReferenceCode(code))
    }

    /// Degraded resolution: substitute a documented default for the missing
    /// step so a partial spec still usually yields a code. Quotes built this
    /// way must carry `is_estimated`.
    pub fn reference_code_with_defaults(
        &self,
        selections: &Selections,
    ) -> Option<ReferenceCode> {
        let product = selections.product.as_ref()?;

        // Blankets with a fabric but no size default to the medium 30x40.
        if product.as_str() == "blankets" && selections.fabric.is_some() {
            let mut padded = selections.clone();
            padded.size.get_or_insert_with(|| "size_med_30x40".to_string());
            if let Some(code) = self.reference_code(&padded) {
                return Some(code);
            }
        }

        let default = match product.as_str() {
            "blankets" => "BlanketSherpafleece_25x20",
            "canvas" => "Canvas_F18_10x10",
            "photobooks" => "PB_CailuxCover_8x6_Black_20pp",
            "mugs" => "Mug_Basic_White_PackOf2",
            _ => return None,
        };
        Some(ReferenceCode(default.to_string()))
    }

    /// Static fallback product-page id for the remote pricing API, used when
    /// the relational lookup has no row.
    pub fn page_id(&self, selections: &Selections) -> Option<&'static str> {
        let product = selections.product.as_ref()?;
        let id = match product.as_str() {
            "blankets" => match (selections.fabric.as_deref()?, selections.size.as_deref()?) {
                ("fabric_fleece", "size_baby_20x25") => "de485800-93c6-4276-992b-def1ce74d487",
                ("fabric_fleece", "size_med_30x40") => "72af97ca-2ec4-41c3-bd7d-b8e97fdccd75",
                ("fabric_fleece", "size_throw_50x60") => "d593e4ee-0075-484d-b83b-e50c93821e0a",
                ("fabric_fleece", "size_queen_60x80") => "df4daec2-e14b-436e-8f81-4c6888576126",
                ("fabric_mink_touch", "size_baby_20x25") => "818db4ff-7407-458c-957e-cfb7c15371f5",
                ("fabric_mink_touch", "size_med_30x40") => "6fc2bf2d-47d6-49e7-a42e-66acfd72cc07",
                ("fabric_mink_touch", "size_throw_50x60") => "bbeed95b-adb5-4394-8ddb-857ec8a86f42",
                ("fabric_mink_touch", "size_queen_60x80") => "7749fd23-0c3e-4d7a-9af8-9e754a3c2c2c",
                ("fabric_sherpa", "size_baby_20x25") => "06b5ad20-1832-41c6-99ab-985c090dd4d3",
                ("fabric_sherpa", "size_med_30x40") => "0fd9e65c-de5e-48c4-a1a7-559991a3ad77",
                ("fabric_sherpa", "size_throw_50x60") => "6da0bca9-e178-4706-a8b4-fa13dba2b15e",
                ("fabric_sherpa", "size_queen_60x80") => "11c5bbfb-ca04-4d3d-884e-8c649c99cfa4",
                ("fabric_double_sided", "size_baby_20x25") => {
                    "de485800-93c6-4276-992b-def1ce74d487"
                }
                ("fabric_double_sided", "size_med_30x40") => {
                    "2b526c4a-56d1-4b43-892c-477cd6188746"
                }
                ("fabric_double_sided", "size_throw_50x60") => {
                    "4bddf7f7-8b6d-468a-85f5-0c69ffff218b"
                }
                ("fabric_double_sided", "size_queen_60x80") => {
                    "2ed7ec8f-1c6a-42cd-a843-dbbf1499c137"
                }
                _ => return None,
            },
            "canvas" => match selections.size.as_deref()? {
                "size_6x6" | "size_10x10" => "6eca1e34-1a2f-4b2c-9768-52a6395923aa",
                "size_12x12" => "c340938c-f5fe-4f77-8082-7b23e75d727c",
                "size_11x14" => "f7822b38-be1c-4d54-be94-b6282d40a064",
                "size_16x20" => "81979a7c-131d-47a6-9a22-74135296bb78",
                "size_36x24" => "da359457-fc24-4894-9409-137b28d0f8e0",
                "size_30x40" => "f54f9463-fb3d-4517-b83c-a25cf055bb66",
                _ => return None,
            },
            "photobooks" => match (selections.cover.as_deref()?, selections.size.as_deref()?) {
                ("cover_hard_cover", "size_8x6") => "d5baac75-ecae-40e7-b5c3-84538d73e671",
                ("cover_hard_cover", "size_8x8") => "c5f5e749-b8df-46b8-b816-4913cdc3ca21",
                ("cover_hard_cover", "size_11x8_5") => "f6692129-efb5-446c-921a-82701949b8ba",
                ("cover_hard_cover", "size_11x11") => "db99bfe6-e0f0-4563-8266-5f8e7182bbce",
                ("cover_leather_cover", "size_8x6") => "e8727d92-48fd-4f32-8119-bb1c39623a1a",
                ("cover_leather_cover", "size_8x8") => "fc45fc2c-bcc4-4060-aae3-087e8ac73b3a",
                ("cover_leather_cover", "size_11x8_5") => "4433f22b-375d-4c0f-8348-0da4868e019b",
                ("cover_leather_cover", "size_11x11") => "dd072355-e333-42cc-bc40-e2ed2e4a16ac",
                _ => return None,
            },
            "mugs" => match selections.mug_type.as_deref()? {
                "type_classic_mug" | "type_magic_mug" => "eb6dc4dd-4a29-4771-bc15-481ed4e44dd0",
                "type_latte_mug" | "type_magic_latte_mug" => {
                    "e8fecd98-c9a9-440a-8abf-2da2966a7b6b"
                }
                _ => return None,
            },
            _ => return None,
        };
        Some(id)
    }
}
