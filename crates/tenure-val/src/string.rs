pub use ecow::EcoString as TenStr;
