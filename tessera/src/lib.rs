pub use logging::*;
pub use {
    tessera_aggregate as aggregate, tessera_buffer as buffer, tessera_dtype as dtype,
    tessera_error as error, tessera_segment as segment, tessera_startree as startree,
    tessera_table as table,
};

mod logging;

pub mod encodings {
    pub use {tessera_chunk as chunk, tessera_fixedbit as fixedbit};
}
