pub mod applier;
pub mod builder;
pub mod package;
pub mod project;
pub mod xml;

pub use applier::{ApplyReport, ApplyStatus, Applier, SkipReason};
pub use builder::build_blocks;
pub use package::DocxPackage;
pub use xml::{XmlElement, XmlNode, XmlTree};
