mod driver;
mod numeric;
mod params;

pub use driver::PostgresDriver;
