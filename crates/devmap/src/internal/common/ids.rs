define_id_type!(JobId, u32);
define_id_type!(StepId, u32);
