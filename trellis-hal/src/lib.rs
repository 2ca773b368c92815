//! # trellis-hal
//!
//! HAL documents for trellis-http routes.
//!
//! Resource types are described by [`ResourceMetadata`]: the identifier
//! property, the controller actions returning one resource or a list of
//! them, and the relations to other resource types. Handlers returning a
//! [`ResourceObject`] get their result composed by [`HalResultTransformer`]
//! into `{"_links": {..}, ..entity, "_embedded": {..}}`. Relations named in
//! the `_embedded` query parameter are embedded by calling their accessor
//! routes within the same request.

mod composer;
mod context;
mod error;
mod metadata;
mod module;
mod resource;
mod transformer;

pub use composer::*;
pub use context::*;
pub use error::*;
pub use metadata::*;
pub use module::*;
pub use resource::*;
pub use transformer::*;
