/*!
 * Figure translators.
 *
 * A translator converts a figure source (`.svg`, `.dot`, `.fig`, ...) into a
 * file the compiler can include. Definitions are loaded from three levels
 * (system, user, document); configuration can include or exclude each
 * translator per level, and two includable translators for the same source
 * type are reported as a conflict instead of one being picked silently.
 *
 * - `definition`: definition files and the `Translator` type
 * - `repository`: levels, inclusion and conflict resolution, lookup
 * - `runner`: staleness check and execution of commands and scripts
 */

pub mod definition;
pub mod repository;
pub mod runner;

pub use self::definition::{Execution, Translator, TranslatorLevel};
pub use self::repository::{InclusionOverrides, TranslatorDirectories, TranslatorRepository};
pub use self::runner::{GenerationOutcome, ImageGenerator};
