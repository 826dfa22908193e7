use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

use super::AppContext;
use crate::cli::{TemplateAddArgs, TemplateCommand};
use crate::model::{Field, Region, Template, TemplateKind};
use crate::util::read_json;

pub fn run(app: &AppContext, command: TemplateCommand) -> Result<()> {
    let mut store = app.template_store()?;

    match command {
        TemplateCommand::Add(args) => {
            let template = template_from_args(&args)?;
            let name = template.name.clone();
            store
                .add(template)
                .with_context(|| format!("template '{name}' was rejected"))?;
            info!(name = %name, "template added");
        }
        TemplateCommand::List => {
            let mut output = io::BufWriter::new(io::stdout().lock());
            for template in store.templates() {
                writeln!(
                    output,
                    "{}\t{}\t{}",
                    template.name,
                    template.kind.as_str(),
                    template.column_names().join(", ")
                )?;
            }
            output.flush()?;
        }
        TemplateCommand::Show(args) => {
            let Some(template) = store.find(&args.name) else {
                bail!("template '{}' not found", args.name);
            };
            let mut output = io::BufWriter::new(io::stdout().lock());
            serde_json::to_writer_pretty(&mut output, template)?;
            writeln!(output)?;
            output.flush()?;
        }
        TemplateCommand::Delete(args) => {
            if store.delete(&args.name)? {
                info!(name = %args.name, "template deleted");
            } else {
                info!(name = %args.name, "template not found; nothing deleted");
            }
        }
    }

    Ok(())
}

fn template_from_args(args: &TemplateAddArgs) -> Result<Template> {
    if let Some(path) = &args.from_json {
        return read_json(path);
    }

    let Some(name) = args.name.clone() else {
        bail!("--name is required unless --from-json is given");
    };

    let mut fields = args
        .field
        .iter()
        .map(|arg| parse_field_arg(arg))
        .collect::<Result<Vec<_>>>()?;

    for arg in &args.region {
        let (column, region) = parse_region_arg(arg)?;
        match fields.iter_mut().find(|field| field.column_name == column) {
            Some(field) => field.region = Some(region),
            None => fields.push(Field::region(column, region)),
        }
    }

    let kind = TemplateKind::from(args.kind);
    Ok(Template {
        name,
        kind,
        numeric_optimize: kind == TemplateKind::Visual && args.numeric_optimize,
        fields,
    })
}

/// Parses `Column: pattern`. The pattern may itself contain colons.
fn parse_field_arg(arg: &str) -> Result<Field> {
    let Some((column, pattern)) = arg.split_once(':') else {
        bail!("field '{arg}' must look like 'Column: pattern'");
    };
    Ok(Field::text(column.trim(), pattern.trim()))
}

/// Parses `Column=x,y,width,height`.
fn parse_region_arg(arg: &str) -> Result<(String, Region)> {
    let Some((column, rect)) = arg.rsplit_once('=') else {
        bail!("region '{arg}' must look like 'Column=x,y,width,height'");
    };
    let numbers = rect
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("invalid number '{part}' in region '{arg}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let [x, y, width, height] = numbers[..] else {
        bail!("region '{arg}' needs exactly four numbers");
    };
    Ok((
        column.trim().to_string(),
        Region {
            x,
            y,
            width,
            height,
        },
    ))
}
