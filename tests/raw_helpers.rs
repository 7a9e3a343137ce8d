#![allow(dead_code)]

use fundamentals::utils::encode_latin1;
use std::path::Path;

pub const STATEMENT_HEADER: &str = "CNPJ_CIA;DT_REFER;VERSAO;DENOM_CIA;CD_CVM;GRUPO_DFP;MOEDA;ESCALA_MOEDA;ORDEM_EXERC;DT_FIM_EXERC;CD_CONTA;DS_CONTA;VL_CONTA;ST_CONTA_FIXA";

pub const REGISTRY_HEADER: &str = "CNPJ_CIA;DENOM_SOCIAL;DENOM_COMERC;DT_REG;SIT;TP_MERC;SETOR_ATIV";

/// One long-format line of a DFP statement file
pub struct Line<'a> {
    pub period: &'a str,
    pub company: &'a str,
    pub code: &'a str,
    pub description: &'a str,
    pub value: &'a str,
    pub order: &'a str,
}

pub fn final_line<'a>(
    period: &'a str,
    company: &'a str,
    code: &'a str,
    description: &'a str,
    value: &'a str,
) -> Line<'a> {
    Line {
        period,
        company,
        code,
        description,
        value,
        order: "ÚLTIMO",
    }
}

/// Write `dfp_cia_aberta_<kind>_<year>.csv` in Latin-1, as CVM publishes it
pub fn write_statement(raw_dir: &Path, kind: &str, year: i32, lines: &[Line]) {
    let mut content = String::from(STATEMENT_HEADER);
    content.push('\n');
    for l in lines {
        content.push_str(&format!(
            "00.000.000/0001-00;{};1;{};999;DF Consolidado;REAL;MIL;{};{};{};{};{};S\n",
            l.period, l.company, l.order, l.period, l.code, l.description, l.value
        ));
    }
    std::fs::create_dir_all(raw_dir).expect("failed to create raw dir");
    std::fs::write(
        raw_dir.join(format!("dfp_cia_aberta_{}_{}.csv", kind, year)),
        encode_latin1(&content),
    )
    .expect("failed to write statement fixture");
}

/// Write the persisted company universe (`companies.csv`)
pub fn write_companies(raw_dir: &Path, names: &[&str]) {
    let mut content = String::from("DENOM_SOCIAL\n");
    for name in names {
        content.push_str(name);
        content.push('\n');
    }
    std::fs::create_dir_all(raw_dir).expect("failed to create raw dir");
    std::fs::write(raw_dir.join("companies.csv"), encode_latin1(&content))
        .expect("failed to write companies fixture");
}

/// ACME with current assets 100 and current liabilities 50 at 2023-12-31
pub fn write_acme_2023(raw_dir: &Path) {
    write_companies(raw_dir, &["ACME S.A."]);
    write_statement(
        raw_dir,
        "BPA_con",
        2023,
        &[final_line("2023-12-31", "ACME S.A.", "1.01", "Ativo Circulante", "100")],
    );
    write_statement(
        raw_dir,
        "BPP_con",
        2023,
        &[final_line("2023-12-31", "ACME S.A.", "2.01", "Passivo Circulante", "50")],
    );
}
