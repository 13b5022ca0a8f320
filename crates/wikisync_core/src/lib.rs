pub mod compare;
pub mod config;
pub mod expected;
pub mod normalize;
pub mod page;
pub mod pages;
pub mod params;
pub mod patch;
pub mod reconcile;
pub mod report;
pub mod runtime;
pub mod template;

pub use compare::{CompareOptions, Mismatch, compare_param_dicts};
pub use normalize::{KeySet, normalize_param_value_for_compare, normalize_qty_list_assume_one};
pub use params::{ParamMap, parse_template_params};
pub use patch::{PatchOptions, PatchOutcome, patch_template_params_in_place};
pub use template::{TemplateBlock, extract_first_template_block, find_template_blocks};
