use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use mvgrid_algo::bulk_metrics_sql;
use mvgrid_cli::OutputFormat;
use mvgrid_io::schema::{primary_key, GEOMETRY_SHAPE_KEY, SRID_KEY};
use mvgrid_io::{foreign_keys, schema_for_table, table_names};
use serde_json::{json, Value};
use tabwriter::TabWriter;

pub fn handle(
    table: Option<&str>,
    show_foreign_keys: bool,
    metrics_sql: bool,
    format: OutputFormat,
) -> Result<()> {
    if metrics_sql {
        println!("{}", bulk_metrics_sql());
        return Ok(());
    }
    if show_foreign_keys {
        return print_foreign_keys(table, format);
    }

    let tables: Vec<&str> = match table {
        Some(name) => {
            schema_for_table(name).ok_or_else(|| anyhow!("unknown table '{}'", name))?;
            vec![name]
        }
        None => table_names().to_vec(),
    };
    match format {
        OutputFormat::Plain => print_columns(&tables),
        OutputFormat::Json => {
            let doc: Vec<Value> = tables.iter().map(|t| table_json(t)).collect();
            serde_json::to_writer_pretty(io::stdout(), &doc).context("serializing catalog")?;
            println!();
            Ok(())
        }
    }
}

fn geometry_note(metadata: &std::collections::HashMap<String, String>) -> String {
    match (metadata.get(GEOMETRY_SHAPE_KEY), metadata.get(SRID_KEY)) {
        (Some(shape), Some(srid)) => format!("{} (SRID {})", shape, srid),
        (Some(shape), None) => shape.clone(),
        _ => String::new(),
    }
}

fn print_columns(tables: &[&str]) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "TABLE\tCOLUMN\tTYPE\tNULLABLE\tKEY\tGEOMETRY")?;
    for table in tables {
        let Some(schema) = schema_for_table(table) else {
            continue;
        };
        let key = primary_key(table);
        for field in schema.fields() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}",
                table,
                field.name(),
                field.data_type(),
                field.is_nullable(),
                if key.contains(&field.name().as_str()) { "PK" } else { "" },
                geometry_note(field.metadata())
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn table_json(table: &str) -> Value {
    let columns: Vec<Value> = schema_for_table(table)
        .map(|schema| {
            schema
                .fields()
                .iter()
                .map(|f| {
                    json!({
                        "name": f.name(),
                        "type": f.data_type().to_string(),
                        "nullable": f.is_nullable(),
                        "metadata": f.metadata(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "table": table,
        "primary_key": primary_key(table),
        "columns": columns,
    })
}

fn print_foreign_keys(table: Option<&str>, format: OutputFormat) -> Result<()> {
    let keys: Vec<_> = foreign_keys()
        .iter()
        .filter(|k| table.map_or(true, |t| k.table == t))
        .collect();
    match format {
        OutputFormat::Plain => {
            let mut writer = TabWriter::new(io::stdout());
            writeln!(writer, "TABLE\tCOLUMN\tREFERENCES")?;
            for key in keys {
                writeln!(
                    writer,
                    "{}\t{}\t{}.{}",
                    key.table, key.column, key.references, key.referenced_column
                )?;
            }
            writer.flush()?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(io::stdout(), &keys)
                .context("serializing foreign keys")?;
            println!();
        }
    }
    Ok(())
}
