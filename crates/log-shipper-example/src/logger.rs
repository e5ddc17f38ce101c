// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line format for the example's own diagnostics:
//!
//! ```text
//! LOG_SHIPPER | LEVEL | [module | ][span{fields}: ]message fields
//! ```
//!
//! The module is only shown for events raised inside the shipper library, so
//! worker and transport lines can be told apart from the example's own output.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

const LIBRARY_TARGET: &str = "log_shipper::";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(writer, "LOG_SHIPPER | {:<5} | ", metadata.level())?;

        if let Some(module) = metadata.target().strip_prefix(LIBRARY_TARGET) {
            write!(writer, "{module} | ")?;
        }

        let spans = ctx.event_scope().into_iter().flat_map(|scope| scope.from_root());
        for span in spans {
            let ext = span.extensions();
            match ext.get::<FormattedFields<N>>() {
                Some(fields) if !fields.is_empty() => {
                    write!(writer, "{}{{{fields}}}: ", span.name())?;
                }
                _ => write!(writer, "{}: ", span.name())?,
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
