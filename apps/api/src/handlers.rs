pub mod health;
pub mod internal;
pub mod outpainting;
pub mod picture_edit;
pub mod spaces;
