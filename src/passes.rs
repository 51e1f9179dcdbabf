//! The passes that transform a design in place

pub mod freduce;
pub mod fsm_recode;
pub mod opt_const;
pub mod opt_rmdff;
pub mod opt_share;
pub mod rename;
pub mod techmap;

use crate::pass::Pass;

/// All built-in passes and backends, in registration order
pub(crate) fn all_passes() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(rename::RenamePass),
        Box::new(opt_const::OptConstPass),
        Box::new(opt_share::OptSharePass),
        Box::new(opt_rmdff::OptRmdffPass),
        Box::new(techmap::OptPass),
        Box::new(freduce::FreducePass),
        Box::new(fsm_recode::FsmRecodePass),
        Box::new(techmap::TechmapPass),
        Box::new(techmap::FlattenPass),
        Box::new(crate::io::blif::WriteBlifPass),
        Box::new(crate::io::edif::WriteEdifPass),
    ]
}
