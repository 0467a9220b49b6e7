mod send_errors;

pub(crate) use send_errors::ParallelSendErrorsExt;
