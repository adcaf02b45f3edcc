/*!
This crate explores the model space of a processing tree: the deletion operation enumerates every structurally valid reduced tree, the substitution operation splits repeated parameters into separately fit ones, and the random search driver samples, checks, and fits candidate models.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod deletion;
mod error;
mod random;
mod rgs;
mod substitution;

pub use self::deletion::{load_candidates, save_candidates, Deletion};
pub use self::error::SearchError;
pub use self::random::{RandomSearch, SearchRecord};
pub use self::rgs::{rgs_count, rgs_enumerate, rgs_unrank};
pub use self::substitution::{apply_rgs, Substitution};
