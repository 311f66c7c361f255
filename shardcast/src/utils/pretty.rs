use std::fmt::Display;

use crate::routing::PartitionSet;

/// Displays a partition set as `{0,2,4}`. Used in log fields.
pub(crate) struct PartitionsDisplayer<'a>(pub(crate) &'a PartitionSet);

impl Display for PartitionsDisplayer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        CommaSeparatedDisplayer(self.0.iter()).fmt(f)?;
        f.write_str("}")
    }
}

pub(crate) struct CommaSeparatedDisplayer<I>(pub(crate) I);

impl<I, T> Display for CommaSeparatedDisplayer<I>
where
    I: Iterator<Item = T> + Clone,
    T: Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for t in self.0.clone() {
            if first {
                first = false;
            } else {
                f.write_str(",")?;
            }
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}
