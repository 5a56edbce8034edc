pub mod settings;

pub use settings::UnlockOptions;
