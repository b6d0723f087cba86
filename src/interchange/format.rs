//! The codec seam between documents and resources.

use std::fmt;

use super::InterchangeError;
use super::context::{LoadContext, SaveContext};
use super::options::SaveOptions;

/// A document encoding the resource set can load and save through.
///
/// A format decodes a document into the resource a [`LoadContext`] targets
/// and encodes the resource a [`SaveContext`] exposes. Formats never touch
/// resources or stores directly; the resource set drives them.
pub trait ModelFormat: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// URI extensions mapped to this format by the resource set factories.
    fn extensions(&self) -> &'static [&'static str];

    fn mime_type(&self) -> &'static str;

    /// Decode `input`, creating objects and roots through `ctx`.
    fn read(&self, input: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError>;

    /// Encode the resource behind `ctx`.
    fn write(&self, ctx: &SaveContext<'_>, options: &SaveOptions) -> Result<Vec<u8>, InterchangeError>;

    /// Quick well-formedness check that does not build any objects.
    fn validate(&self, input: &[u8]) -> Result<(), InterchangeError> {
        let _ = input;
        Ok(())
    }
}
