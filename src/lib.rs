use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod columns;
pub mod dataset;
pub mod engine;
pub mod schema;
