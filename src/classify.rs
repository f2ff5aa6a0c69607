use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub data_type: &'static str,
    pub file_format: String,
}

/// Everything after the first `.` of the final path segment, lowercased.
pub fn extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.split_once('.').map(|(_, ext)| ext.to_lowercase())
}

pub fn classify(file_name: &str) -> Result<Classification, RegistryError> {
    let ext =
        extension(file_name).ok_or_else(|| RegistryError::Classification(file_name.to_string()))?;
    let data_type = data_type(&ext).ok_or_else(|| RegistryError::Classification(ext.clone()))?;
    let file_format = format_code(&ext).map(str::to_string).unwrap_or(ext);
    Ok(Classification {
        data_type,
        file_format,
    })
}

fn data_type(ext: &str) -> Option<&'static str> {
    let value = match ext {
        "fa" | "fq" | "fasta" | "fastq" | "fq.gz" | "fastq.gz" => "Unaligned Reads",
        "bam" | "cram" => "Aligned Reads",
        "bai" | "crai" | "bam.bai" | "cram.crai" => "Aligned Reads Index",
        "vcf" | "vcf.gz" | "gvcf" | "gvcf.gz" | "g.vcf.gz" => "Variant Calls",
        "g.vcf.gz.tbi" => "Individual Variant Calls",
        _ => return None,
    };
    Some(value)
}

fn format_code(ext: &str) -> Option<&'static str> {
    let value = match ext {
        "fq" | "fq.gz" | "fastq.gz" => "fastq",
        "fa" => "fasta",
        "bam.bai" => "bai",
        "cram.crai" => "crai",
        "vcf.gz" => "vcf",
        "gvcf" | "gvcf.gz" | "g.vcf.gz" => "gVCF",
        "g.vcf.gz.tbi" => "tbi",
        _ => return None,
    };
    Some(value)
}
