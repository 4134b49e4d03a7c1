pub mod identifier;
pub mod image;
pub mod other_name;
pub mod person;
pub mod redirect;

pub use identifier::PersonIdentifier;
pub use image::PersonImage;
pub use other_name::OtherName;
pub use person::{EditLimitation, Person};
pub use redirect::PersonRedirect;
