//! Fixer implementations, one per toolchain generation.
//!
//! - `dotnet` - pushes the artifact into the global packages cache
//! - `nuget` - adds the artifact to a private source and force-updates from it

pub mod dotnet;
pub mod nuget;

pub use dotnet::DotnetFixer;
pub use nuget::NugetFixer;
