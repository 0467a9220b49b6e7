use rayon::iter::ParallelIterator;

// Error routing for parallel iterators of results: `Ok` values continue
// down the chain, errors are converted and sent to a channel.

#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct ParallelSendErrors<I, M> {
    iter: I,
    channel: crossbeam_channel::Sender<M>,
}

impl<I, E, T, M> ParallelIterator for ParallelSendErrors<I, M>
where
    I: ParallelIterator<Item = Result<T, E>>,
    M: From<E> + Send,
    T: Send,
{
    type Item = T;

    fn drive_unindexed<C>(self, consumer: C) -> C::Result
    where
        C: rayon::iter::plumbing::UnindexedConsumer<Self::Item>,
    {
        let channel = self.channel;
        self.iter
            .filter_map(move |v| match v {
                Ok(v) => Some(v),
                Err(e) => {
                    // A closed channel only means nobody is counting.
                    let _ = channel.send(M::from(e));
                    None
                }
            })
            .drive_unindexed(consumer)
    }
}

pub trait ParallelSendErrorsExt<T, E>: ParallelIterator<Item = Result<T, E>> {
    /// Transmit errors to a channel, leaving Ok values in the iterator
    fn send_errors<M: From<E>>(
        self,
        channel: &crossbeam_channel::Sender<M>,
    ) -> ParallelSendErrors<Self, M> {
        ParallelSendErrors {
            iter: self,
            channel: channel.clone(),
        }
    }
}

impl<I, T, E> ParallelSendErrorsExt<T, E> for I where I: ParallelIterator<Item = Result<T, E>> {}
